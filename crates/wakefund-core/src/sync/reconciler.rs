//! Snapshot merge and the background reconciliation loop.
//!
//! Merge policy, per entity class:
//! - alarms: keyed by id; a both-sides conflict resolves field-wise so
//!   nothing edited on only one device is discarded;
//! - snooze records: union by id, never a replace;
//! - donation stats: additive fields re-derived from the merged record
//!   log, streak fields carried from the snapshot with the most recent
//!   streak activity.

use std::sync::{Arc, Mutex};

use chrono::{Datelike, NaiveDate, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::types::{Snapshot, SyncError, SyncService, SyncStatus};
use crate::alarm::Alarm;
use crate::ledger::{DonationStats, SnoozeRecord};
use crate::service::AlarmService;

/// Merge two snapshots. Pure; callers decide what to do with the result.
pub fn merge(local: &Snapshot, remote: &Snapshot, today: NaiveDate) -> Snapshot {
    let alarms = merge_alarms(&local.alarms, &remote.alarms);
    let records = merge_records(&local.records, &remote.records);
    let stats = merge_stats(&local.stats, &remote.stats, &records, today);
    Snapshot {
        alarms,
        records,
        stats,
        taken_at: Utc::now(),
    }
}

/// Union by alarm id; ids on both sides go through field-wise merge.
fn merge_alarms(local: &[Alarm], remote: &[Alarm]) -> Vec<Alarm> {
    let mut merged: Vec<Alarm> = Vec::with_capacity(local.len() + remote.len());
    for l in local {
        match remote.iter().find(|r| r.id == l.id) {
            Some(r) => merged.push(merge_alarm(l, r)),
            None => merged.push(l.clone()),
        }
    }
    for r in remote {
        if !local.iter().any(|l| l.id == r.id) {
            merged.push(r.clone());
        }
    }
    merged.sort_by_key(|a| a.created_at);
    merged
}

/// Field-wise conflict resolution for one alarm present on both sides.
///
/// Edited fields follow the copy with the later `updated_at` (direct
/// edits bump it; snooze bookkeeping does not). The snooze fields follow
/// the copy with the later snooze activity instead, so a snooze on one
/// device survives a concurrent label edit on the other.
fn merge_alarm(local: &Alarm, remote: &Alarm) -> Alarm {
    let mut merged = if remote.updated_at > local.updated_at {
        remote.clone()
    } else {
        local.clone()
    };
    let snooze_side = if remote.last_snooze_at > local.last_snooze_at {
        remote
    } else {
        local
    };
    merged.snooze_count = snooze_side.snooze_count;
    merged.last_snooze_at = snooze_side.last_snooze_at;
    merged.created_at = local.created_at.min(remote.created_at);
    merged
}

/// Union by record id. Losing a record here would silently erase a
/// donation from the user's history, so nothing is ever dropped.
fn merge_records(local: &[SnoozeRecord], remote: &[SnoozeRecord]) -> Vec<SnoozeRecord> {
    let mut merged: Vec<SnoozeRecord> = local.to_vec();
    for r in remote {
        if !merged.iter().any(|m| m.id == r.id) {
            merged.push(r.clone());
        }
    }
    merged.sort_by_key(|r| (r.at, r.id));
    merged
}

/// Additive fields come from the merged log (merging them as scalars
/// would double- or under-count); streak fields are single-device
/// session state and follow the snapshot with the newer streak date,
/// except `longest_streak`, where the maximum can never be wrong.
fn merge_stats(
    local: &DonationStats,
    remote: &DonationStats,
    records: &[SnoozeRecord],
    today: NaiveDate,
) -> DonationStats {
    let streak_side = if remote.last_streak_date > local.last_streak_date {
        remote
    } else {
        local
    };
    DonationStats {
        total_donated_cents: records.iter().map(|r| r.charged_cents).sum(),
        total_snoozes: records.len() as u64,
        current_streak: streak_side.current_streak,
        longest_streak: local.longest_streak.max(remote.longest_streak),
        last_streak_date: streak_side.last_streak_date,
        week_donated_cents: records
            .iter()
            .filter(|r| r.at.date_naive().iso_week() == today.iso_week())
            .map(|r| r.charged_cents)
            .sum(),
        week_anchor: today,
        month_donated_cents: records
            .iter()
            .filter(|r| {
                let d = r.at.date_naive();
                d.year() == today.year() && d.month() == today.month()
            })
            .map(|r| r.charged_cents)
            .sum(),
        month_anchor: today,
    }
}

/// Background pull → merge → push cycle against a remote service.
///
/// The pull and push run without any local lock; the merge itself runs
/// inside the facade's write lock against the freshest local snapshot,
/// so a local edit made mid-cycle can never be clobbered.
pub struct SyncReconciler {
    service: Arc<AlarmService>,
    remote: Arc<dyn SyncService>,
    status: Mutex<SyncStatus>,
}

impl SyncReconciler {
    pub fn new(service: Arc<AlarmService>, remote: Arc<dyn SyncService>) -> Self {
        Self {
            service,
            remote,
            status: Mutex::new(SyncStatus::default()),
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.status.lock().expect("status mutex poisoned").clone()
    }

    /// One full reconciliation cycle. Errors are reported as status and
    /// returned; local state is unaffected by a failed cycle.
    pub fn run_once(&self) -> Result<SyncStatus, SyncError> {
        {
            let mut status = self.status.lock().expect("status mutex poisoned");
            status.in_progress = true;
        }
        let result = self.cycle();
        let mut status = self.status.lock().expect("status mutex poisoned");
        status.in_progress = false;
        match result {
            Ok(()) => {
                status.last_sync_at = Some(Utc::now());
                status.last_error = None;
                Ok(status.clone())
            }
            Err(err) => {
                warn!(%err, "sync cycle failed");
                status.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    fn cycle(&self) -> Result<(), SyncError> {
        let remote_snapshot = self.remote.pull()?;
        debug!(
            alarms = remote_snapshot.alarms.len(),
            records = remote_snapshot.records.len(),
            "pulled remote snapshot"
        );
        // Merge against the freshest local state, under the write lock.
        let merged = self.service.apply_remote(remote_snapshot);
        self.remote.push(&merged)?;
        info!(
            alarms = merged.alarms.len(),
            records = merged.records.len(),
            "sync cycle complete"
        );
        Ok(())
    }

    /// Out-of-band cycle for a push-triggered "changed" signal.
    pub fn notify_changed(&self) -> Result<SyncStatus, SyncError> {
        self.run_once()
    }

    /// Run cycles forever at the given interval. Abort the handle to stop.
    pub fn spawn_periodic(self: &Arc<Self>, interval: std::time::Duration) -> JoinHandle<()> {
        let reconciler = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let _ = reconciler.run_once();
            }
        })
    }
}
