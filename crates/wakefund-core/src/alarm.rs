//! Alarm entity and fire-time arithmetic.
//!
//! An alarm carries a time of day (not bound to a date), an optional set
//! of repeat weekdays, and its snooze economics. All money is integer
//! cents; floats never touch a currency field.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Identifier of an alarm. Stable across devices; sync merges key on it.
pub type AlarmId = Uuid;

/// Time of day, wall-clock, no date attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmTime {
    pub hour: u8,
    pub minute: u8,
}

impl AlarmTime {
    pub fn new(hour: u8, minute: u8) -> Result<Self, ValidationError> {
        if hour > 23 || minute > 59 {
            return Err(ValidationError::InvalidTime { hour, minute });
        }
        Ok(Self { hour, minute })
    }

    pub fn as_naive(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, 0)
            .unwrap_or(NaiveTime::MIN)
    }
}

/// A user-configured wake-up request.
///
/// `snooze_count` and `last_snooze_at` are mutated only by the snooze
/// economy engine; everything else changes through direct edits, which
/// bump `updated_at` (the sync merge key for edit conflicts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    pub id: AlarmId,
    pub time: AlarmTime,
    #[serde(default)]
    pub label: String,
    pub enabled: bool,
    /// Weekday numbers from Monday (1) through Sunday (7).
    /// Empty set means the alarm fires once.
    #[serde(default)]
    pub repeat_days: BTreeSet<u8>,
    /// Base snooze cost in cents. The engine-wide tier table governs the
    /// actual charge; this field seeds the first tier for display.
    pub base_cost_cents: i64,
    /// Snoozes consumed today. `0 <= snooze_count <= max_snoozes`.
    pub snooze_count: u32,
    pub last_snooze_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Bumped on every direct edit; not touched by snooze bookkeeping.
    pub updated_at: DateTime<Utc>,
}

impl Alarm {
    pub fn new(time: AlarmTime, label: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            time,
            label: label.into(),
            enabled: true,
            repeat_days: BTreeSet::new(),
            base_cost_cents: 99,
            snooze_count: 0,
            last_snooze_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark a direct edit.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        AlarmTime::new(self.time.hour, self.time.minute)?;
        if let Some(&day) = self.repeat_days.iter().find(|d| **d < 1 || **d > 7) {
            return Err(ValidationError::InvalidWeekday(day));
        }
        Ok(())
    }

    /// Next fire instant(s) strictly after `now`.
    ///
    /// One-shot alarms yield a single instant (today if the time is still
    /// ahead, otherwise tomorrow). Repeating alarms yield one instant per
    /// repeat weekday, each the soonest occurrence of that weekday.
    pub fn next_fire_times(&self, now: DateTime<Utc>) -> Vec<(Option<u8>, DateTime<Utc>)> {
        let time = self.as_naive_time();
        if self.repeat_days.is_empty() {
            return vec![(None, next_occurrence(now, time))];
        }
        let mut fires: Vec<(Option<u8>, DateTime<Utc>)> = self
            .repeat_days
            .iter()
            .map(|&day| (Some(day), next_weekday_occurrence(now, time, day)))
            .collect();
        fires.sort_by_key(|(_, at)| *at);
        fires
    }

    fn as_naive_time(&self) -> NaiveTime {
        self.time.as_naive()
    }
}

/// Soonest instant strictly after `now` with the given time of day.
fn next_occurrence(now: DateTime<Utc>, time: NaiveTime) -> DateTime<Utc> {
    let candidate = now.date_naive().and_time(time).and_utc();
    if candidate > now {
        candidate
    } else {
        candidate + Duration::days(1)
    }
}

/// Soonest instant strictly after `now` falling on `weekday` (1 = Monday)
/// with the given time of day.
fn next_weekday_occurrence(now: DateTime<Utc>, time: NaiveTime, weekday: u8) -> DateTime<Utc> {
    let today = now.weekday().number_from_monday() as i64;
    let ahead = (weekday as i64 - today).rem_euclid(7);
    let candidate = (now.date_naive() + Duration::days(ahead)).and_time(time).and_utc();
    if candidate > now {
        candidate
    } else {
        candidate + Duration::days(7)
    }
}
