//! Snooze economy engine.
//!
//! Snoozing costs an escalating fee taken from a fixed tier table and
//! capped at a per-day ceiling. The engine computes the cost, clears it
//! with the payment authority, and applies the atomic bookkeeping:
//! alarm snooze fields, ledger record, aggregate totals, streak break.
//! It never talks to the alerting backends itself; it hands the caller a
//! re-arm/stop directive for the scheduling coordinator.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::alarm::Alarm;
use crate::ledger::{SnoozeRecord, StatisticsLedger};
use crate::storage::config::EconomySection;

/// Outcome reported by the external payment authority.
///
/// `Unknown` covers timeouts and ambiguous results: the charge may or
/// may not have gone through, so the engine must not mutate anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeOutcome {
    Success,
    Declined,
    Cancelled,
    Unknown,
}

/// External payment authority. The one collaborator allowed to block the
/// caller: the charge must be confirmed before the snooze is granted.
pub trait PaymentAuthority: Send + Sync {
    fn charge(&self, amount_cents: i64) -> ChargeOutcome;
}

/// Why a snooze was not granted. No state was mutated in any case; the
/// alarm keeps alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SnoozeRejection {
    #[error("snooze ceiling reached ({max} per day)")]
    CeilingReached { max: u32 },
    #[error("payment declined")]
    PaymentDeclined,
    #[error("payment cancelled")]
    PaymentCancelled,
    #[error("payment result unknown (timed out)")]
    PaymentTimedOut,
}

/// A granted snooze: what was charged and when to re-alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnoozeGrant {
    pub amount_cents: i64,
    /// Snooze count after the grant.
    pub snooze_count: u32,
    pub rearm_after_minutes: u32,
}

/// What a dismissal did to the streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DismissSummary {
    /// The alarm had zero snoozes when dismissed.
    pub clean: bool,
    pub current_streak: u32,
    pub longest_streak: u32,
}

/// Engine-wide cost tiers and ceiling. Not per-alarm.
#[derive(Debug, Clone)]
pub struct SnoozeEconomyEngine {
    tiers_cents: Vec<i64>,
    max_snoozes: u32,
    snooze_minutes: u32,
}

impl SnoozeEconomyEngine {
    pub fn new(economy: &EconomySection) -> Self {
        Self {
            tiers_cents: economy.tiers_cents.clone(),
            max_snoozes: economy.max_snoozes,
            snooze_minutes: economy.snooze_minutes,
        }
    }

    pub fn max_snoozes(&self) -> u32 {
        self.max_snoozes
    }

    pub fn snooze_duration(&self) -> Duration {
        Duration::minutes(self.snooze_minutes as i64)
    }

    /// Cost of the alarm's next snooze: `tiers[min(count, len - 1)]`.
    /// Defined for every count; clamps at the last tier.
    pub fn next_snooze_cost(&self, alarm: &Alarm) -> i64 {
        if self.tiers_cents.is_empty() {
            return 0;
        }
        let index = (alarm.snooze_count as usize).min(self.tiers_cents.len() - 1);
        self.tiers_cents[index]
    }

    pub fn has_reached_ceiling(&self, alarm: &Alarm) -> bool {
        alarm.snooze_count >= self.max_snoozes
    }

    /// Attempt a snooze at `now`.
    ///
    /// Ceiling and payment failures reject with no state change. On
    /// success the alarm fields, ledger record, and aggregates commit
    /// together; the returned grant tells the caller when to re-arm.
    pub fn snooze(
        &self,
        alarm: &mut Alarm,
        ledger: &mut StatisticsLedger,
        payment: &dyn PaymentAuthority,
        now: DateTime<Utc>,
    ) -> Result<SnoozeGrant, SnoozeRejection> {
        if self.has_reached_ceiling(alarm) {
            return Err(SnoozeRejection::CeilingReached {
                max: self.max_snoozes,
            });
        }

        let amount_cents = self.next_snooze_cost(alarm);
        match payment.charge(amount_cents) {
            ChargeOutcome::Success => {}
            ChargeOutcome::Declined => return Err(SnoozeRejection::PaymentDeclined),
            ChargeOutcome::Cancelled => return Err(SnoozeRejection::PaymentCancelled),
            ChargeOutcome::Unknown => {
                warn!(alarm_id = %alarm.id, amount_cents, "charge outcome unknown, not granting snooze");
                return Err(SnoozeRejection::PaymentTimedOut);
            }
        }

        // Clamp rather than trust: the ceiling check above makes overflow
        // a contract violation, not a user-visible condition.
        alarm.snooze_count = (alarm.snooze_count + 1).min(self.max_snoozes);
        alarm.last_snooze_at = Some(now);
        ledger.record_snooze(SnoozeRecord::new(alarm.id, amount_cents, now));

        info!(
            alarm_id = %alarm.id,
            amount_cents,
            snooze_count = alarm.snooze_count,
            "snooze granted"
        );
        Ok(SnoozeGrant {
            amount_cents,
            snooze_count: alarm.snooze_count,
            rearm_after_minutes: self.snooze_minutes,
        })
    }

    /// End an alerting cycle.
    ///
    /// Reads the snooze count before clearing it: zero means a clean
    /// wake-up and the streak advances, anything else resets it. Always
    /// clears the count and the last-snooze timestamp, so repeating the
    /// call is harmless.
    pub fn dismiss(
        &self,
        alarm: &mut Alarm,
        ledger: &mut StatisticsLedger,
        now: DateTime<Utc>,
    ) -> DismissSummary {
        let clean = alarm.snooze_count == 0;
        let (current_streak, longest_streak) = ledger.record_dismissal(clean, now.date_naive());
        alarm.snooze_count = 0;
        alarm.last_snooze_at = None;
        info!(alarm_id = %alarm.id, clean, current_streak, "alarm dismissed");
        DismissSummary {
            clean,
            current_streak,
            longest_streak,
        }
    }

    /// Daily maintenance: the ceiling applies per calendar day, so any
    /// alarm whose last snooze was not today starts over at zero.
    /// Returns how many alarms were reset.
    pub fn reset_stale_counts<'a>(
        &self,
        alarms: impl Iterator<Item = &'a mut Alarm>,
        today: NaiveDate,
    ) -> usize {
        let mut reset = 0;
        for alarm in alarms {
            if alarm.snooze_count == 0 {
                continue;
            }
            let snoozed_today = alarm
                .last_snooze_at
                .map(|at| at.date_naive() == today)
                .unwrap_or(false);
            if !snoozed_today {
                alarm.snooze_count = 0;
                alarm.last_snooze_at = None;
                reset += 1;
            }
        }
        if reset > 0 {
            info!(reset, "daily snooze counts reset");
        }
        reset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::AlarmTime;
    use crate::storage::MemoryStore;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Payment authority scripted with a fixed outcome.
    struct ScriptedPayment {
        outcome: ChargeOutcome,
        charges: AtomicUsize,
    }

    impl ScriptedPayment {
        fn new(outcome: ChargeOutcome) -> Self {
            Self {
                outcome,
                charges: AtomicUsize::new(0),
            }
        }
    }

    impl PaymentAuthority for ScriptedPayment {
        fn charge(&self, _amount_cents: i64) -> ChargeOutcome {
            self.charges.fetch_add(1, Ordering::SeqCst);
            self.outcome
        }
    }

    fn engine() -> SnoozeEconomyEngine {
        SnoozeEconomyEngine::new(&EconomySection::default())
    }

    fn ledger() -> StatisticsLedger {
        StatisticsLedger::load(Arc::new(MemoryStore::new())).unwrap()
    }

    fn alarm() -> Alarm {
        Alarm::new(AlarmTime::new(7, 0).unwrap(), "test")
    }

    #[test]
    fn five_snoozes_charge_the_tier_table_then_reject() {
        let engine = engine();
        let mut ledger = ledger();
        let mut alarm = alarm();
        let payment = ScriptedPayment::new(ChargeOutcome::Success);
        let now = Utc::now();

        let mut charged = Vec::new();
        for _ in 0..5 {
            let grant = engine.snooze(&mut alarm, &mut ledger, &payment, now).unwrap();
            charged.push(grant.amount_cents);
        }
        assert_eq!(charged, vec![99, 199, 299, 499, 999]);
        assert_eq!(alarm.snooze_count, 5);

        let rejection = engine
            .snooze(&mut alarm, &mut ledger, &payment, now)
            .unwrap_err();
        assert_eq!(rejection, SnoozeRejection::CeilingReached { max: 5 });
        assert_eq!(alarm.snooze_count, 5);
        assert_eq!(ledger.aggregate().total_snoozes, 5);
        // The rejected sixth attempt never reached the payment authority.
        assert_eq!(payment.charges.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn successful_snooze_updates_every_aggregate() {
        let engine = engine();
        let mut ledger = ledger();
        let mut alarm = alarm();
        let payment = ScriptedPayment::new(ChargeOutcome::Success);
        let now = Utc::now();

        ledger.record_dismissal(true, now.date_naive());
        assert_eq!(ledger.aggregate().current_streak, 1);

        let grant = engine.snooze(&mut alarm, &mut ledger, &payment, now).unwrap();
        let stats = ledger.aggregate();
        assert_eq!(stats.total_donated_cents, grant.amount_cents);
        assert_eq!(stats.total_snoozes, 1);
        assert_eq!(stats.current_streak, 0);
        assert_eq!(ledger.records().len(), 1);
        assert_eq!(ledger.records()[0].charged_cents, grant.amount_cents);
        assert_eq!(alarm.last_snooze_at, Some(now));
    }

    #[test]
    fn declined_cancelled_and_unknown_mutate_nothing() {
        let engine = engine();
        let now = Utc::now();
        for (outcome, expected) in [
            (ChargeOutcome::Declined, SnoozeRejection::PaymentDeclined),
            (ChargeOutcome::Cancelled, SnoozeRejection::PaymentCancelled),
            (ChargeOutcome::Unknown, SnoozeRejection::PaymentTimedOut),
        ] {
            let mut ledger = ledger();
            let mut alarm = alarm();
            let payment = ScriptedPayment::new(outcome);
            let rejection = engine
                .snooze(&mut alarm, &mut ledger, &payment, now)
                .unwrap_err();
            assert_eq!(rejection, expected);
            assert_eq!(alarm.snooze_count, 0);
            assert!(alarm.last_snooze_at.is_none());
            assert_eq!(ledger.records().len(), 0);
            assert_eq!(ledger.aggregate().total_donated_cents, 0);
        }
    }

    #[test]
    fn clean_dismiss_advances_streak_and_clears_count() {
        let engine = engine();
        let mut ledger = ledger();
        let mut alarm = alarm();
        let now = Utc::now();

        let summary = engine.dismiss(&mut alarm, &mut ledger, now);
        assert!(summary.clean);
        assert_eq!(summary.current_streak, 1);
        assert_eq!(summary.longest_streak, 1);
        assert_eq!(alarm.snooze_count, 0);
        assert!(alarm.last_snooze_at.is_none());
    }

    #[test]
    fn snoozed_dismiss_resets_streak() {
        let engine = engine();
        let mut ledger = ledger();
        let mut alarm = alarm();
        let payment = ScriptedPayment::new(ChargeOutcome::Success);
        let now = Utc::now();

        engine.dismiss(&mut alarm, &mut ledger, now);
        engine.snooze(&mut alarm, &mut ledger, &payment, now).unwrap();
        let summary = engine.dismiss(&mut alarm, &mut ledger, now);

        assert!(!summary.clean);
        assert_eq!(summary.current_streak, 0);
        assert_eq!(summary.longest_streak, 1);
        assert_eq!(alarm.snooze_count, 0);
    }

    #[test]
    fn stale_counts_reset_only_when_not_snoozed_today() {
        let engine = engine();
        let today = Utc::now().date_naive();

        let mut yesterday_alarm = alarm();
        yesterday_alarm.snooze_count = 3;
        yesterday_alarm.last_snooze_at = Some(Utc::now() - Duration::days(1));

        let mut today_alarm = alarm();
        today_alarm.snooze_count = 2;
        today_alarm.last_snooze_at = Some(Utc::now());

        let mut untouched = alarm();

        let mut alarms = [&mut yesterday_alarm, &mut today_alarm, &mut untouched];
        let reset = engine.reset_stale_counts(alarms.iter_mut().map(|a| &mut **a), today);

        assert_eq!(reset, 1);
        assert_eq!(yesterday_alarm.snooze_count, 0);
        assert_eq!(today_alarm.snooze_count, 2);
        assert_eq!(untouched.snooze_count, 0);
    }

    proptest! {
        #[test]
        fn cost_clamps_at_last_tier(count in 0u32..50) {
            let engine = engine();
            let mut a = alarm();
            a.snooze_count = count;
            let tiers = [99i64, 199, 299, 499, 999];
            let expected = tiers[(count as usize).min(tiers.len() - 1)];
            prop_assert_eq!(engine.next_snooze_cost(&a), expected);
        }

        #[test]
        fn cost_is_monotonic_in_snooze_count(count in 0u32..49) {
            let engine = engine();
            let mut a = alarm();
            a.snooze_count = count;
            let first = engine.next_snooze_cost(&a);
            a.snooze_count = count + 1;
            let second = engine.next_snooze_cost(&a);
            prop_assert!(second >= first);
        }

        #[test]
        fn ceiling_predicate_matches_definition(count in 0u32..20, max in 1u32..10) {
            let economy = EconomySection { max_snoozes: max, ..EconomySection::default() };
            let engine = SnoozeEconomyEngine::new(&economy);
            let mut a = alarm();
            a.snooze_count = count;
            prop_assert_eq!(engine.has_reached_ceiling(&a), count >= max);
        }
    }
}
