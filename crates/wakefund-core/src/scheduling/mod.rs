//! Alarm scheduling against two unreliable alerting backends.
//!
//! The primary backend can alert even when the app process is not
//! running, but needs platform authorization. The fallback backend is a
//! best-effort local notification: it can be dismissed without effect,
//! delayed, or dropped under resource pressure, and callers must treat
//! it as such. The coordinator picks one per alarm at schedule time and
//! silently routes to the fallback on any primary failure.

pub mod coordinator;

pub use coordinator::SchedulingCoordinator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alarm::{Alarm, AlarmId};
use crate::error::ScheduleError;

/// Per-alarm schedule state as last reported by the active backend.
///
/// Ephemeral, never persisted. The coordinator can request transitions
/// but the backend's asynchronous confirmation is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleState {
    Scheduled,
    Alerting,
    SnoozeCountdown,
    Paused,
    Stopped,
}

/// Which backend is believed active for an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Primary,
    Fallback,
}

/// Platform-level authorization result for a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Granted,
    Denied,
}

/// One registration unit handed to a backend: a single fire instant,
/// optionally recurring weekly on `weekday` (1 = Monday).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireSpec {
    pub alarm_id: AlarmId,
    pub at: DateTime<Utc>,
    pub weekday: Option<u8>,
    pub repeats: bool,
    pub label: String,
}

/// Asynchronous state transition reported by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendEvent {
    pub alarm_id: AlarmId,
    pub state: ScheduleState,
    pub at: DateTime<Utc>,
}

/// An alerting backend. Requests are fire-and-forget; confirmations
/// arrive on the `BackendEvent` channel the backend was built with.
pub trait AlertingBackend: Send + Sync {
    fn kind(&self) -> BackendKind;
    fn request_authorization(&self) -> Authorization;
    /// Register one fire unit. Backends that need per-weekday
    /// registration receive one call per repeat weekday.
    fn schedule(&self, spec: &FireSpec) -> Result<(), ScheduleError>;
    /// Drop every live registration for the alarm. Must be safe to call
    /// for ids the backend has never seen.
    fn cancel(&self, alarm_id: AlarmId);
    /// Re-arm after a snooze countdown.
    fn snooze(&self, alarm_id: AlarmId, rearm_after: chrono::Duration) -> Result<(), ScheduleError>;
    /// Silence an alerting alarm.
    fn stop(&self, alarm_id: AlarmId);
}

/// Registration units for an alarm: one per repeat weekday, or a single
/// one-shot unit.
pub fn fire_specs(alarm: &Alarm, now: DateTime<Utc>) -> Vec<FireSpec> {
    let repeats = !alarm.repeat_days.is_empty();
    alarm
        .next_fire_times(now)
        .into_iter()
        .map(|(weekday, at)| FireSpec {
            alarm_id: alarm.id,
            at,
            weekday,
            repeats,
            label: alarm.label.clone(),
        })
        .collect()
}
