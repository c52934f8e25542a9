//! The alarm service facade.
//!
//! The only entry point exposed to UI layers, intents, and background
//! triggers. One mutex serializes every mutation of the registry and
//! ledger, so a snooze racing a sync merge cannot lose an update;
//! readers get cloned snapshots. A revision counter bumps on every
//! mutation so the reconciler can tell whether local state moved under
//! it.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{NaiveDate, Utc};
use tokio::sync::broadcast;
use tracing::info;

use crate::alarm::{Alarm, AlarmId};
use crate::economy::{DismissSummary, PaymentAuthority, SnoozeEconomyEngine, SnoozeGrant};
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::ledger::{DonationStats, SnoozeRecord, StatisticsLedger};
use crate::registry::AlarmRegistry;
use crate::scheduling::SchedulingCoordinator;
use crate::storage::{Config, SnapshotStore};
use crate::sync::{merge, Snapshot};

struct ServiceInner {
    registry: AlarmRegistry,
    ledger: StatisticsLedger,
    revision: u64,
    maintenance_day: Option<NaiveDate>,
}

pub struct AlarmService {
    inner: Mutex<ServiceInner>,
    engine: SnoozeEconomyEngine,
    coordinator: Arc<SchedulingCoordinator>,
    payment: Arc<dyn PaymentAuthority>,
    events: broadcast::Sender<Event>,
}

impl AlarmService {
    /// Build the facade over a store and the externally wired
    /// collaborators. The broadcast sender must be the same one the
    /// coordinator re-broadcasts backend transitions on, so subscribers
    /// see a single event stream.
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        config: &Config,
        coordinator: Arc<SchedulingCoordinator>,
        payment: Arc<dyn PaymentAuthority>,
        events: broadcast::Sender<Event>,
    ) -> Result<Self> {
        let registry = AlarmRegistry::load(Arc::clone(&store))?;
        let ledger = StatisticsLedger::load(store)?;
        Ok(Self {
            inner: Mutex::new(ServiceInner {
                registry,
                ledger,
                revision: 0,
                maintenance_day: None,
            }),
            engine: SnoozeEconomyEngine::new(&config.economy),
            coordinator,
            payment,
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn revision(&self) -> u64 {
        self.lock().revision
    }

    // ── Alarm CRUD ───────────────────────────────────────────────────

    pub fn create_alarm(&self, alarm: Alarm) -> Result<Alarm> {
        let now = Utc::now();
        let mut inner = self.lock();
        self.maintain(&mut inner, now.date_naive());
        inner.registry.create(alarm.clone())?;
        inner.revision += 1;
        self.coordinator.schedule(&alarm, now);
        self.emit_alarms_changed(inner.revision);
        info!(alarm_id = %alarm.id, "alarm created");
        Ok(alarm)
    }

    /// Replace an alarm with an edited copy and re-register it with the
    /// backends. Unknown ids are a silent no-op, matching the registry.
    pub fn update_alarm(&self, alarm: Alarm) -> Result<()> {
        let now = Utc::now();
        let mut inner = self.lock();
        self.maintain(&mut inner, now.date_naive());
        let id = alarm.id;
        inner.registry.update(alarm)?;
        if let Some(stored) = inner.registry.get(id).cloned() {
            inner.revision += 1;
            self.coordinator.reschedule(&stored, now);
            self.emit_alarms_changed(inner.revision);
        }
        Ok(())
    }

    pub fn delete_alarm(&self, id: AlarmId) {
        let now = Utc::now();
        let mut inner = self.lock();
        self.maintain(&mut inner, now.date_naive());
        if inner.registry.delete(id).is_some() {
            inner.revision += 1;
            self.coordinator.cancel(id);
            self.emit_alarms_changed(inner.revision);
            info!(alarm_id = %id, "alarm deleted");
        }
    }

    /// Flip enabled state; scheduling follows (a disabled alarm is
    /// cancelled on both backends). Returns the new state when the alarm
    /// exists.
    pub fn toggle_alarm(&self, id: AlarmId) -> Option<bool> {
        let now = Utc::now();
        let mut inner = self.lock();
        self.maintain(&mut inner, now.date_naive());
        let enabled = inner.registry.toggle(id)?;
        inner.revision += 1;
        if let Some(alarm) = inner.registry.get(id).cloned() {
            self.coordinator.schedule(&alarm, now);
        }
        self.emit_alarms_changed(inner.revision);
        Some(enabled)
    }

    pub fn get_alarm(&self, id: AlarmId) -> Option<Alarm> {
        self.lock().registry.get(id).cloned()
    }

    pub fn list_alarms(&self) -> Vec<Alarm> {
        self.lock().registry.list()
    }

    // ── Snooze economy ───────────────────────────────────────────────

    /// What the next snooze would cost, if the alarm exists. Runs the
    /// daily maintenance first: across midnight the quote must come from
    /// the reset count, not yesterday's tier.
    pub fn next_snooze_cost(&self, id: AlarmId) -> Option<i64> {
        let mut inner = self.lock();
        self.maintain(&mut inner, Utc::now().date_naive());
        inner
            .registry
            .get(id)
            .map(|alarm| self.engine.next_snooze_cost(alarm))
    }

    /// Snooze an alerting alarm: charge the escalating fee and re-arm
    /// after the configured countdown. Rejections (ceiling, payment)
    /// leave every piece of state untouched and the alarm alerting.
    pub fn snooze(&self, id: AlarmId) -> Result<SnoozeGrant> {
        let now = Utc::now();
        let mut inner = self.lock();
        self.maintain(&mut inner, now.date_naive());
        let ServiceInner {
            registry, ledger, ..
        } = &mut *inner;
        let alarm = registry.get_mut(id).ok_or(CoreError::UnknownAlarm(id))?;

        match self
            .engine
            .snooze(alarm, ledger, self.payment.as_ref(), now)
        {
            Ok(grant) => {
                registry.persist_after_engine_mutation();
                inner.revision += 1;
                self.coordinator.snooze(id, self.engine.snooze_duration());
                self.emit(Event::SnoozeCharged {
                    alarm_id: id,
                    amount_cents: grant.amount_cents,
                    snooze_count: grant.snooze_count,
                    at: now,
                });
                self.emit(Event::StatsChanged { at: now });
                Ok(grant)
            }
            Err(rejection) => {
                self.emit(Event::SnoozeRejected {
                    alarm_id: id,
                    reason: rejection.to_string(),
                    at: now,
                });
                Err(rejection.into())
            }
        }
    }

    /// End an alerting cycle. Idempotent: repeating the call clears
    /// nothing further and re-requests a stop the backends tolerate.
    pub fn dismiss(&self, id: AlarmId) -> Result<DismissSummary> {
        let now = Utc::now();
        let mut inner = self.lock();
        self.maintain(&mut inner, now.date_naive());
        let ServiceInner {
            registry, ledger, ..
        } = &mut *inner;
        let alarm = registry.get_mut(id).ok_or(CoreError::UnknownAlarm(id))?;

        let summary = self.engine.dismiss(alarm, ledger, now);
        registry.persist_after_engine_mutation();
        inner.revision += 1;
        self.coordinator.stop(id);
        self.emit(Event::AlarmDismissed {
            alarm_id: id,
            clean: summary.clean,
            at: now,
        });
        if summary.clean {
            self.emit(Event::StreakAdvanced {
                current_streak: summary.current_streak,
                longest_streak: summary.longest_streak,
                at: now,
            });
        }
        self.emit(Event::StatsChanged { at: now });
        Ok(summary)
    }

    // ── Statistics ───────────────────────────────────────────────────

    pub fn stats(&self) -> DonationStats {
        self.lock().ledger.aggregate()
    }

    pub fn records(&self) -> Vec<SnoozeRecord> {
        self.lock().ledger.records().to_vec()
    }

    /// User-initiated statistics reset. Keeps the transaction log.
    pub fn reset_statistics(&self) {
        let now = Utc::now();
        let mut inner = self.lock();
        inner.ledger.reset_aggregate(now.date_naive());
        inner.revision += 1;
        self.emit(Event::StatsChanged { at: now });
    }

    // ── Scheduling ───────────────────────────────────────────────────

    /// Re-register every alarm with the backends. Call at startup: which
    /// backend holds which registration is unknown after a restart.
    pub fn schedule_all(&self) {
        let now = Utc::now();
        let inner = self.lock();
        for alarm in inner.registry.list() {
            self.coordinator.schedule(&alarm, now);
        }
    }

    pub fn coordinator(&self) -> &SchedulingCoordinator {
        &self.coordinator
    }

    // ── Sync ─────────────────────────────────────────────────────────

    /// Local state plus the revision it was taken at.
    pub fn snapshot(&self) -> (Snapshot, u64) {
        let inner = self.lock();
        (
            Snapshot {
                alarms: inner.registry.list(),
                records: inner.ledger.records().to_vec(),
                stats: inner.ledger.aggregate(),
                taken_at: Utc::now(),
            },
            inner.revision,
        )
    }

    /// Merge a pulled remote snapshot into local state.
    ///
    /// Runs entirely inside the write lock against the freshest local
    /// snapshot, so no local edit between the reconciler's pull and this
    /// call can be clobbered. Returns the merged snapshot for pushing.
    pub fn apply_remote(&self, remote: Snapshot) -> Snapshot {
        let now = Utc::now();
        let today = now.date_naive();
        let mut inner = self.lock();
        self.maintain(&mut inner, today);

        let local = Snapshot {
            alarms: inner.registry.list(),
            records: inner.ledger.records().to_vec(),
            stats: inner.ledger.aggregate(),
            taken_at: now,
        };
        let merged = merge(&local, &remote, today);

        inner.registry.replace_all(merged.alarms.clone());
        inner
            .ledger
            .replace_contents(merged.records.clone(), merged.stats.clone());
        inner.revision += 1;

        for alarm in &merged.alarms {
            self.coordinator.schedule(alarm, now);
        }

        self.emit_alarms_changed(inner.revision);
        self.emit(Event::StatsChanged { at: now });
        self.emit(Event::SyncCompleted {
            alarms: merged.alarms.len(),
            records: merged.records.len(),
            at: now,
        });
        merged
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, ServiceInner> {
        self.inner.lock().expect("service mutex poisoned")
    }

    /// Daily maintenance, run at the first operation of each day: the
    /// snooze ceiling is per calendar day, so stale counts reset.
    fn maintain(&self, inner: &mut ServiceInner, today: NaiveDate) {
        if inner.maintenance_day == Some(today) {
            return;
        }
        let reset = self
            .engine
            .reset_stale_counts(inner.registry.alarms_mut(), today);
        if reset > 0 {
            inner.registry.persist_after_engine_mutation();
            inner.revision += 1;
        }
        inner.maintenance_day = Some(today);
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine; the engine never depends on listeners.
        let _ = self.events.send(event);
    }

    fn emit_alarms_changed(&self, revision: u64) {
        self.emit(Event::AlarmsChanged {
            revision,
            at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::AlarmTime;
    use crate::economy::{ChargeOutcome, SnoozeRejection};
    use crate::error::ScheduleError;
    use crate::scheduling::{
        AlertingBackend, Authorization, BackendKind, FireSpec, ScheduleState,
    };
    use crate::storage::{MemoryStore, SnapshotKind, SnapshotStore};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingBackend {
        kind: BackendKind,
        authorized: bool,
        live: Mutex<HashMap<AlarmId, Vec<FireSpec>>>,
        cancel_calls: AtomicUsize,
    }

    impl RecordingBackend {
        fn new(kind: BackendKind, authorized: bool) -> Arc<Self> {
            Arc::new(Self {
                kind,
                authorized,
                live: Mutex::new(HashMap::new()),
                cancel_calls: AtomicUsize::new(0),
            })
        }

        fn live_units(&self, id: AlarmId) -> usize {
            self.live.lock().unwrap().get(&id).map_or(0, |v| v.len())
        }
    }

    impl AlertingBackend for RecordingBackend {
        fn kind(&self) -> BackendKind {
            self.kind
        }
        fn request_authorization(&self) -> Authorization {
            if self.authorized {
                Authorization::Granted
            } else {
                Authorization::Denied
            }
        }
        fn schedule(&self, spec: &FireSpec) -> Result<(), ScheduleError> {
            self.live
                .lock()
                .unwrap()
                .entry(spec.alarm_id)
                .or_default()
                .push(spec.clone());
            Ok(())
        }
        fn cancel(&self, alarm_id: AlarmId) {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
            self.live.lock().unwrap().remove(&alarm_id);
        }
        fn snooze(
            &self,
            _alarm_id: AlarmId,
            _rearm_after: chrono::Duration,
        ) -> Result<(), ScheduleError> {
            Ok(())
        }
        fn stop(&self, _alarm_id: AlarmId) {}
    }

    struct ScriptedPayment(ChargeOutcome);

    impl PaymentAuthority for ScriptedPayment {
        fn charge(&self, _amount_cents: i64) -> ChargeOutcome {
            self.0
        }
    }

    struct Fixture {
        service: AlarmService,
        primary: Arc<RecordingBackend>,
        fallback: Arc<RecordingBackend>,
    }

    fn fixture(outcome: ChargeOutcome) -> Fixture {
        fixture_over_store(outcome, Arc::new(MemoryStore::new()))
    }

    fn fixture_over_store(outcome: ChargeOutcome, store: Arc<dyn SnapshotStore>) -> Fixture {
        let primary = RecordingBackend::new(BackendKind::Primary, true);
        let fallback = RecordingBackend::new(BackendKind::Fallback, true);
        let (events, _) = broadcast::channel(256);
        let coordinator = Arc::new(SchedulingCoordinator::new(
            Arc::clone(&primary) as Arc<dyn AlertingBackend>,
            Arc::clone(&fallback) as Arc<dyn AlertingBackend>,
            events.clone(),
        ));
        let service = AlarmService::new(
            store,
            &Config::default(),
            coordinator,
            Arc::new(ScriptedPayment(outcome)),
            events,
        )
        .unwrap();
        Fixture {
            service,
            primary,
            fallback,
        }
    }

    fn wake_alarm() -> Alarm {
        Alarm::new(AlarmTime::new(7, 0).unwrap(), "wake")
    }

    #[test]
    fn create_schedules_on_primary() {
        let fx = fixture(ChargeOutcome::Success);
        let alarm = fx.service.create_alarm(wake_alarm()).unwrap();
        assert_eq!(fx.primary.live_units(alarm.id), 1);
        assert_eq!(fx.fallback.live_units(alarm.id), 0);
        assert_eq!(
            fx.service.coordinator().state(alarm.id),
            Some(ScheduleState::Scheduled)
        );
    }

    #[test]
    fn full_snooze_day_through_the_facade() {
        let fx = fixture(ChargeOutcome::Success);
        let alarm = fx.service.create_alarm(wake_alarm()).unwrap();

        let mut charged = Vec::new();
        for _ in 0..5 {
            charged.push(fx.service.snooze(alarm.id).unwrap().amount_cents);
        }
        assert_eq!(charged, vec![99, 199, 299, 499, 999]);
        assert_eq!(fx.service.get_alarm(alarm.id).unwrap().snooze_count, 5);

        let err = fx.service.snooze(alarm.id).unwrap_err();
        assert!(matches!(
            err,
            CoreError::SnoozeRejected(SnoozeRejection::CeilingReached { max: 5 })
        ));

        let stats = fx.service.stats();
        assert_eq!(stats.total_donated_cents, 99 + 199 + 299 + 499 + 999);
        assert_eq!(stats.total_snoozes, 5);
        assert_eq!(fx.service.records().len(), 5);

        // Waking up after snoozing: count clears, streak does not advance.
        let summary = fx.service.dismiss(alarm.id).unwrap();
        assert!(!summary.clean);
        assert_eq!(summary.current_streak, 0);
        assert_eq!(fx.service.get_alarm(alarm.id).unwrap().snooze_count, 0);
    }

    #[test]
    fn declined_payment_surfaces_and_mutates_nothing() {
        let fx = fixture(ChargeOutcome::Declined);
        let alarm = fx.service.create_alarm(wake_alarm()).unwrap();
        let revision_before = fx.service.revision();

        let err = fx.service.snooze(alarm.id).unwrap_err();
        assert!(matches!(
            err,
            CoreError::SnoozeRejected(SnoozeRejection::PaymentDeclined)
        ));
        assert_eq!(fx.service.get_alarm(alarm.id).unwrap().snooze_count, 0);
        assert_eq!(fx.service.stats().total_donated_cents, 0);
        assert_eq!(fx.service.revision(), revision_before);
    }

    #[test]
    fn stale_edit_cannot_reopen_the_daily_ceiling() {
        let fx = fixture(ChargeOutcome::Success);
        let alarm = fx.service.create_alarm(wake_alarm()).unwrap();
        let stale = fx.service.get_alarm(alarm.id).unwrap();

        for _ in 0..5 {
            fx.service.snooze(alarm.id).unwrap();
        }

        // Label edit built from a copy taken before any snooze.
        let mut edited = stale;
        edited.label = "renamed".into();
        fx.service.update_alarm(edited).unwrap();

        let stored = fx.service.get_alarm(alarm.id).unwrap();
        assert_eq!(stored.label, "renamed");
        assert_eq!(stored.snooze_count, 5);

        let err = fx.service.snooze(alarm.id).unwrap_err();
        assert!(matches!(
            err,
            CoreError::SnoozeRejected(SnoozeRejection::CeilingReached { max: 5 })
        ));
        assert_eq!(fx.service.stats().total_snoozes, 5);
    }

    #[test]
    fn cost_quote_runs_daily_maintenance_first() {
        let store: Arc<dyn SnapshotStore> = Arc::new(MemoryStore::new());
        let mut stale = wake_alarm();
        stale.snooze_count = 5;
        stale.last_snooze_at = Some(Utc::now() - chrono::Duration::days(1));
        let bytes = serde_json::to_vec(&vec![stale.clone()]).unwrap();
        store.save(SnapshotKind::Alarms, &bytes).unwrap();

        // The quote is the first operation of the day, so the stale
        // count resets before the tier lookup.
        let fx = fixture_over_store(ChargeOutcome::Success, store);
        assert_eq!(fx.service.next_snooze_cost(stale.id), Some(99));
        assert_eq!(fx.service.get_alarm(stale.id).unwrap().snooze_count, 0);
    }

    #[test]
    fn clean_dismiss_advances_streak() {
        let fx = fixture(ChargeOutcome::Success);
        let alarm = fx.service.create_alarm(wake_alarm()).unwrap();
        let summary = fx.service.dismiss(alarm.id).unwrap();
        assert!(summary.clean);
        assert_eq!(summary.current_streak, 1);
        assert_eq!(fx.service.stats().longest_streak, 1);
    }

    #[test]
    fn snooze_unknown_alarm_errors() {
        let fx = fixture(ChargeOutcome::Success);
        let err = fx.service.snooze(uuid::Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, CoreError::UnknownAlarm(_)));
    }

    #[test]
    fn toggle_off_cancels_on_both_backends() {
        let fx = fixture(ChargeOutcome::Success);
        let alarm = fx.service.create_alarm(wake_alarm()).unwrap();
        assert_eq!(fx.service.toggle_alarm(alarm.id), Some(false));
        assert_eq!(fx.primary.live_units(alarm.id), 0);
        assert_eq!(fx.fallback.live_units(alarm.id), 0);
        assert_eq!(fx.service.toggle_alarm(alarm.id), Some(true));
        assert_eq!(fx.primary.live_units(alarm.id), 1);
    }

    #[test]
    fn delete_cancels_and_bumps_revision() {
        let fx = fixture(ChargeOutcome::Success);
        let alarm = fx.service.create_alarm(wake_alarm()).unwrap();
        let before = fx.service.revision();
        fx.service.delete_alarm(alarm.id);
        assert!(fx.service.get_alarm(alarm.id).is_none());
        assert!(fx.service.revision() > before);
        assert!(fx.primary.cancel_calls.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn events_are_broadcast_for_snooze_and_dismiss() {
        let fx = fixture(ChargeOutcome::Success);
        let alarm = fx.service.create_alarm(wake_alarm()).unwrap();
        let mut rx = fx.service.subscribe();

        fx.service.snooze(alarm.id).unwrap();
        fx.service.dismiss(alarm.id).unwrap();

        let mut saw_charge = false;
        let mut saw_dismiss = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                Event::SnoozeCharged {
                    alarm_id,
                    amount_cents,
                    ..
                } => {
                    assert_eq!(alarm_id, alarm.id);
                    assert_eq!(amount_cents, 99);
                    saw_charge = true;
                }
                Event::AlarmDismissed { alarm_id, .. } => {
                    assert_eq!(alarm_id, alarm.id);
                    saw_dismiss = true;
                }
                _ => {}
            }
        }
        assert!(saw_charge);
        assert!(saw_dismiss);
    }

    #[test]
    fn reset_statistics_keeps_records() {
        let fx = fixture(ChargeOutcome::Success);
        let alarm = fx.service.create_alarm(wake_alarm()).unwrap();
        fx.service.snooze(alarm.id).unwrap();
        fx.service.reset_statistics();
        assert_eq!(fx.service.stats().total_donated_cents, 0);
        assert_eq!(fx.service.records().len(), 1);
    }
}
