//! Snooze transaction log and derived donation statistics.
//!
//! The `SnoozeRecord` log is the source of truth: append-only, never
//! rewritten except by an explicit user-requested bulk reset of history.
//! `DonationStats` is maintained incrementally on top of it; the sync
//! merge re-derives the additive fields from the merged log instead of
//! trusting either side's scalars.

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::alarm::AlarmId;
use crate::error::StoreError;
use crate::storage::{save_with_retry, SnapshotKind, SnapshotStore};

/// One snooze transaction. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnoozeRecord {
    pub id: Uuid,
    pub alarm_id: AlarmId,
    pub charged_cents: i64,
    pub at: DateTime<Utc>,
}

impl SnoozeRecord {
    pub fn new(alarm_id: AlarmId, charged_cents: i64, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            alarm_id,
            charged_cents,
            at,
        }
    }
}

/// Derived donation aggregate.
///
/// Week/month sums are valid only while their anchor date falls inside
/// the current ISO week / calendar month; the rollover functions below
/// must run before any accumulation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DonationStats {
    pub total_donated_cents: i64,
    pub total_snoozes: u64,
    /// Consecutive days dismissed without snoozing.
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_streak_date: Option<NaiveDate>,
    pub week_donated_cents: i64,
    pub week_anchor: NaiveDate,
    pub month_donated_cents: i64,
    pub month_anchor: NaiveDate,
}

/// Zero the week sum and re-anchor if `today` is outside the anchored
/// ISO week. Any number of elapsed weeks resets the same way.
pub fn rollover_week_if_needed(stats: &mut DonationStats, today: NaiveDate) {
    if stats.week_anchor.iso_week() != today.iso_week() {
        stats.week_donated_cents = 0;
        stats.week_anchor = today;
    }
}

/// Zero the month sum and re-anchor if `today` is outside the anchored
/// calendar month.
pub fn rollover_month_if_needed(stats: &mut DonationStats, today: NaiveDate) {
    let same_month = stats.month_anchor.year() == today.year()
        && stats.month_anchor.month() == today.month();
    if !same_month {
        stats.month_donated_cents = 0;
        stats.month_anchor = today;
    }
}

/// Append-only ledger plus its incremental aggregate.
pub struct StatisticsLedger {
    records: Vec<SnoozeRecord>,
    stats: DonationStats,
    store: Arc<dyn SnapshotStore>,
}

impl StatisticsLedger {
    /// Load the ledger from the store, starting empty when no snapshot
    /// exists yet.
    pub fn load(store: Arc<dyn SnapshotStore>) -> Result<Self, StoreError> {
        let records = match store.load(SnapshotKind::Records)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::ReadFailed(e.to_string()))?,
            None => Vec::new(),
        };
        let stats = match store.load(SnapshotKind::Stats)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::ReadFailed(e.to_string()))?,
            None => DonationStats::default(),
        };
        Ok(Self {
            records,
            stats,
            store,
        })
    }

    pub fn records(&self) -> &[SnoozeRecord] {
        &self.records
    }

    pub fn aggregate(&self) -> DonationStats {
        self.stats.clone()
    }

    /// Commit one granted snooze: append the record and apply every
    /// incremental aggregate effect (totals, periodic sums after
    /// rollover, streak break).
    pub fn record_snooze(&mut self, record: SnoozeRecord) {
        let today = record.at.date_naive();
        rollover_week_if_needed(&mut self.stats, today);
        rollover_month_if_needed(&mut self.stats, today);

        self.stats.total_donated_cents += record.charged_cents;
        self.stats.total_snoozes += 1;
        self.stats.week_donated_cents += record.charged_cents;
        self.stats.month_donated_cents += record.charged_cents;
        // A snooze always breaks the wake streak.
        self.stats.current_streak = 0;

        self.records.push(record);
        self.persist();
    }

    /// Streak bookkeeping for a dismissal. `clean` means the alarm had
    /// zero snoozes when dismissed. Returns (current, longest).
    ///
    /// The streak counts days, not dismissals: a second clean dismissal
    /// on a day that already advanced it leaves it unchanged, so a
    /// repeated `dismiss` (or a second alarm) cannot inflate it.
    pub fn record_dismissal(&mut self, clean: bool, today: NaiveDate) -> (u32, u32) {
        if clean {
            if self.stats.last_streak_date != Some(today) {
                self.stats.current_streak += 1;
                self.stats.longest_streak =
                    self.stats.longest_streak.max(self.stats.current_streak);
                self.stats.last_streak_date = Some(today);
            }
        } else {
            self.stats.current_streak = 0;
        }
        self.persist();
        (self.stats.current_streak, self.stats.longest_streak)
    }

    /// User-initiated statistics reset. Zeroes the aggregate but keeps
    /// the record log, which stays available for re-derivation.
    pub fn reset_aggregate(&mut self, today: NaiveDate) {
        info!(kept_records = self.records.len(), "resetting donation aggregate");
        self.stats = DonationStats {
            week_anchor: today,
            month_anchor: today,
            ..DonationStats::default()
        };
        self.persist();
    }

    /// Re-derive every additive field from the record log. Streak fields
    /// are left untouched; they are not derivable from records.
    pub fn recompute_totals(&mut self, today: NaiveDate) {
        self.stats.total_donated_cents = self.records.iter().map(|r| r.charged_cents).sum();
        self.stats.total_snoozes = self.records.len() as u64;
        self.stats.week_anchor = today;
        self.stats.month_anchor = today;
        self.stats.week_donated_cents = self
            .records
            .iter()
            .filter(|r| r.at.date_naive().iso_week() == today.iso_week())
            .map(|r| r.charged_cents)
            .sum();
        self.stats.month_donated_cents = self
            .records
            .iter()
            .filter(|r| {
                let d = r.at.date_naive();
                d.year() == today.year() && d.month() == today.month()
            })
            .map(|r| r.charged_cents)
            .sum();
        self.persist();
    }

    /// Install merged state produced by the sync reconciler.
    pub fn replace_contents(&mut self, records: Vec<SnoozeRecord>, stats: DonationStats) {
        self.records = records;
        self.stats = stats;
        self.persist();
    }

    fn persist(&self) {
        save_with_retry(self.store.as_ref(), SnapshotKind::Records, &self.records);
        save_with_retry(self.store.as_ref(), SnapshotKind::Stats, &self.stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    fn ledger() -> StatisticsLedger {
        StatisticsLedger::load(Arc::new(MemoryStore::new())).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn snooze_updates_totals_and_breaks_streak() {
        let mut ledger = ledger();
        ledger.record_dismissal(true, date(2026, 3, 1));
        assert_eq!(ledger.aggregate().current_streak, 1);

        let at = Utc.with_ymd_and_hms(2026, 3, 2, 7, 0, 0).unwrap();
        ledger.record_snooze(SnoozeRecord::new(Uuid::new_v4(), 99, at));

        let stats = ledger.aggregate();
        assert_eq!(stats.total_donated_cents, 99);
        assert_eq!(stats.total_snoozes, 1);
        assert_eq!(stats.week_donated_cents, 99);
        assert_eq!(stats.month_donated_cents, 99);
        assert_eq!(stats.current_streak, 0);
        assert_eq!(ledger.records().len(), 1);
    }

    #[test]
    fn dismissal_streak_rules() {
        let mut ledger = ledger();
        let (cur, longest) = ledger.record_dismissal(true, date(2026, 3, 2));
        assert_eq!((cur, longest), (1, 1));
        let (cur, longest) = ledger.record_dismissal(true, date(2026, 3, 3));
        assert_eq!((cur, longest), (2, 2));
        // Snoozed wake-up: streak resets, longest stays.
        let (cur, longest) = ledger.record_dismissal(false, date(2026, 3, 4));
        assert_eq!((cur, longest), (0, 2));
        assert_eq!(ledger.aggregate().last_streak_date, Some(date(2026, 3, 3)));
    }

    #[test]
    fn same_day_clean_dismissals_count_one_streak_day() {
        let mut ledger = ledger();
        let (cur, _) = ledger.record_dismissal(true, date(2026, 3, 2));
        assert_eq!(cur, 1);
        // Second clean wake-up the same day (another alarm, or a repeated
        // dismiss) does not advance the streak again.
        let (cur, longest) = ledger.record_dismissal(true, date(2026, 3, 2));
        assert_eq!((cur, longest), (1, 1));
        let (cur, _) = ledger.record_dismissal(true, date(2026, 3, 3));
        assert_eq!(cur, 2);
    }

    #[test]
    fn week_rollover_resets_regardless_of_elapsed_weeks() {
        let mut stats = DonationStats {
            week_donated_cents: 500,
            week_anchor: date(2026, 1, 5),
            ..DonationStats::default()
        };
        // Five weeks later.
        rollover_week_if_needed(&mut stats, date(2026, 2, 9));
        assert_eq!(stats.week_donated_cents, 0);
        assert_eq!(stats.week_anchor, date(2026, 2, 9));
    }

    #[test]
    fn week_rollover_keeps_sum_within_same_week() {
        let mut stats = DonationStats {
            week_donated_cents: 500,
            week_anchor: date(2026, 3, 2), // Monday
            ..DonationStats::default()
        };
        rollover_week_if_needed(&mut stats, date(2026, 3, 6)); // Friday, same ISO week
        assert_eq!(stats.week_donated_cents, 500);
    }

    #[test]
    fn month_rollover_resets_across_year_boundary() {
        let mut stats = DonationStats {
            month_donated_cents: 1200,
            month_anchor: date(2025, 12, 20),
            ..DonationStats::default()
        };
        rollover_month_if_needed(&mut stats, date(2026, 1, 3));
        assert_eq!(stats.month_donated_cents, 0);
        assert_eq!(stats.month_anchor, date(2026, 1, 3));
    }

    #[test]
    fn reset_aggregate_keeps_records() {
        let mut ledger = ledger();
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 7, 0, 0).unwrap();
        ledger.record_snooze(SnoozeRecord::new(Uuid::new_v4(), 199, at));
        ledger.reset_aggregate(date(2026, 3, 2));

        assert_eq!(ledger.aggregate().total_donated_cents, 0);
        assert_eq!(ledger.records().len(), 1);

        // Re-derivation from the kept log restores the totals.
        ledger.recompute_totals(date(2026, 3, 2));
        assert_eq!(ledger.aggregate().total_donated_cents, 199);
        assert_eq!(ledger.aggregate().total_snoozes, 1);
    }

    #[test]
    fn recompute_scopes_periodic_sums_to_current_period() {
        let mut ledger = ledger();
        let old = Utc.with_ymd_and_hms(2026, 1, 5, 7, 0, 0).unwrap();
        let recent = Utc.with_ymd_and_hms(2026, 3, 2, 7, 0, 0).unwrap();
        ledger.record_snooze(SnoozeRecord::new(Uuid::new_v4(), 99, old));
        ledger.record_snooze(SnoozeRecord::new(Uuid::new_v4(), 299, recent));

        ledger.recompute_totals(date(2026, 3, 4));
        let stats = ledger.aggregate();
        assert_eq!(stats.total_donated_cents, 398);
        assert_eq!(stats.week_donated_cents, 299);
        assert_eq!(stats.month_donated_cents, 299);
    }

    #[test]
    fn load_round_trips_through_store() {
        let store: Arc<dyn SnapshotStore> = Arc::new(MemoryStore::new());
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 7, 0, 0).unwrap();
        {
            let mut ledger = StatisticsLedger::load(store.clone()).unwrap();
            ledger.record_snooze(SnoozeRecord::new(Uuid::new_v4(), 499, at));
            ledger.record_dismissal(false, date(2026, 3, 2));
        }
        let reloaded = StatisticsLedger::load(store).unwrap();
        assert_eq!(reloaded.records().len(), 1);
        assert_eq!(reloaded.records()[0].charged_cents, 499);
        assert_eq!(reloaded.aggregate().total_donated_cents, 499);
    }
}
