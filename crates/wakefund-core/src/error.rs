//! Core error types for wakefund-core.
//!
//! Backend- and network-facing failures are absorbed at the coordinator
//! and reconciler boundaries and exposed as status or log lines; only
//! payment failures (and programmer errors like duplicate ids) travel
//! back to the caller as errors.

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::economy::SnoozeRejection;
use crate::sync::SyncError;

/// Core error type for wakefund-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Durable-store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Alerting-backend scheduling errors
    #[error("Scheduling error: {0}")]
    Schedule(#[from] ScheduleError),

    /// Snooze was not granted (ceiling or payment outcome)
    #[error("Snooze rejected: {0}")]
    SnoozeRejected(#[from] SnoozeRejection),

    /// Sync errors
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Operation referenced an alarm id the registry does not hold
    #[error("Unknown alarm: {0}")]
    UnknownAlarm(Uuid),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable snapshot store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the backing database
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Snapshot write failed
    #[error("Snapshot write failed: {0}")]
    WriteFailed(String),

    /// Snapshot read failed
    #[error("Snapshot read failed: {0}")]
    ReadFailed(String),

    /// `create` was called with an id the registry already holds
    #[error("Duplicate alarm id: {0}")]
    DuplicateId(Uuid),

    /// Store is locked by another writer
    #[error("Store is locked")]
    Locked,
}

/// Alerting-backend scheduling errors.
///
/// These never abort a whole schedule operation: authorization denial
/// routes silently to the fallback backend, and per-weekday registration
/// failures are logged and retried unit by unit.
#[derive(Error, Debug)]
pub enum ScheduleError {
    /// Platform authorization for the primary backend was denied
    #[error("Alerting authorization denied")]
    AuthorizationDenied,

    /// Backend refused or failed a single registration
    #[error("Backend registration failed: {0}")]
    RegistrationFailed(String),

    /// Backend is unreachable
    #[error("Alerting backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Hour/minute outside 0-23 / 0-59
    #[error("Invalid alarm time {hour:02}:{minute:02}")]
    InvalidTime { hour: u8, minute: u8 },

    /// Repeat day outside Monday(1)..Sunday(7)
    #[error("Invalid repeat weekday: {0} (expected 1-7)")]
    InvalidWeekday(u8),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    StoreError::Locked
                } else {
                    StoreError::WriteFailed(err.to_string())
                }
            }
            _ => StoreError::WriteFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
