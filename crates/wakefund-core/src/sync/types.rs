//! Core types for cross-device snapshot synchronization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alarm::Alarm;
use crate::ledger::{DonationStats, SnoozeRecord};

/// A device's complete synchronizable state at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub alarms: Vec<Alarm>,
    pub records: Vec<SnoozeRecord>,
    pub stats: DonationStats,
    pub taken_at: DateTime<Utc>,
}

/// Current sync status. Non-fatal by construction: sync failures never
/// affect local operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Last successful sync timestamp.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Whether a sync cycle is currently in progress.
    pub in_progress: bool,
    /// Last error, if the most recent cycle failed.
    pub last_error: Option<String>,
}

/// The external synchronization service: pull the remote snapshot, push
/// the merged one. Transport is the implementor's concern.
pub trait SyncService: Send + Sync {
    fn pull(&self) -> Result<Snapshot, SyncError>;
    fn push(&self, snapshot: &Snapshot) -> Result<(), SyncError>;
}

/// Sync error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Sync service unavailable: {0}")]
    Unavailable(String),

    #[error("Sync conflict: {0}")]
    Conflict(String),

    #[error("Push rejected: {0}")]
    PushRejected(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
