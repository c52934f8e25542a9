use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scheduling::{BackendKind, ScheduleState};

/// Every observable state change in the engine produces an Event.
/// UI layers subscribe to the facade's broadcast of these; nothing in
/// the engine depends on anyone listening.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// The alarm collection changed (create/update/toggle/delete/merge).
    /// Subscribers re-read the published list.
    AlarmsChanged {
        revision: u64,
        at: DateTime<Utc>,
    },
    /// An alarm was registered with a backend.
    AlarmScheduled {
        alarm_id: Uuid,
        backend: BackendKind,
        /// Registration units actually live on the backend (at most one
        /// per repeat weekday; fewer on partial success).
        units: usize,
        at: DateTime<Utc>,
    },
    /// A backend confirmed a schedule-state transition.
    ScheduleStateChanged {
        alarm_id: Uuid,
        state: ScheduleState,
        at: DateTime<Utc>,
    },
    SnoozeCharged {
        alarm_id: Uuid,
        amount_cents: i64,
        snooze_count: u32,
        at: DateTime<Utc>,
    },
    SnoozeRejected {
        alarm_id: Uuid,
        reason: String,
        at: DateTime<Utc>,
    },
    AlarmDismissed {
        alarm_id: Uuid,
        /// Dismissed without snoozing.
        clean: bool,
        at: DateTime<Utc>,
    },
    /// The wake streak advanced on a clean dismissal.
    StreakAdvanced {
        current_streak: u32,
        longest_streak: u32,
        at: DateTime<Utc>,
    },
    /// Donation aggregates changed.
    StatsChanged {
        at: DateTime<Utc>,
    },
    SyncCompleted {
        alarms: usize,
        records: usize,
        at: DateTime<Utc>,
    },
}
