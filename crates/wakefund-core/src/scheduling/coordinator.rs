//! Scheduling coordinator.
//!
//! Drives each alarm through the schedule state machine by delegating to
//! the primary or fallback backend. Backend calls are fire-and-forget;
//! confirmed transitions arrive on an mpsc channel consumed by a single
//! event-loop task that updates the observed-state map and re-broadcasts
//! typed events. No backend or authorization failure escalates to the
//! caller as an error.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{
    fire_specs, AlertingBackend, Authorization, BackendEvent, BackendKind, FireSpec, ScheduleState,
};
use crate::alarm::{Alarm, AlarmId};
use crate::events::Event;

pub struct SchedulingCoordinator {
    primary: Arc<dyn AlertingBackend>,
    fallback: Arc<dyn AlertingBackend>,
    /// Which backend took each alarm at schedule time. A belief, not a
    /// guarantee: after a process restart it may be stale, which is why
    /// cancellation always hits both backends.
    chosen: Mutex<HashMap<AlarmId, BackendKind>>,
    /// Last backend-confirmed state per alarm (request states are
    /// written optimistically and overwritten by confirmations).
    states: Arc<Mutex<HashMap<AlarmId, ScheduleState>>>,
    events: broadcast::Sender<Event>,
}

impl SchedulingCoordinator {
    pub fn new(
        primary: Arc<dyn AlertingBackend>,
        fallback: Arc<dyn AlertingBackend>,
        events: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            primary,
            fallback,
            chosen: Mutex::new(HashMap::new()),
            states: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    /// Consume backend transitions until the channel closes. One loop
    /// per coordinator; backends get clones of the channel's sender.
    pub fn spawn_event_loop(&self, mut rx: mpsc::Receiver<BackendEvent>) -> JoinHandle<()> {
        let states = Arc::clone(&self.states);
        let events = self.events.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                debug!(alarm_id = %event.alarm_id, state = ?event.state, "backend transition");
                states
                    .lock()
                    .expect("state mutex poisoned")
                    .insert(event.alarm_id, event.state);
                let _ = events.send(Event::ScheduleStateChanged {
                    alarm_id: event.alarm_id,
                    state: event.state,
                    at: event.at,
                });
            }
        })
    }

    /// Register the alarm's next fire time(s).
    ///
    /// Cancels any live registration first, so scheduling the same alarm
    /// twice leaves exactly one live schedule per (alarm, weekday) pair.
    /// Primary authorization denial or total primary failure silently
    /// routes to the fallback backend; per-weekday failures are retried
    /// once each and partial success is kept.
    pub fn schedule(&self, alarm: &Alarm, now: DateTime<Utc>) {
        self.cancel_on_both(alarm.id);
        if !alarm.enabled {
            self.chosen.lock().expect("chosen mutex poisoned").remove(&alarm.id);
            self.set_state(alarm.id, ScheduleState::Stopped);
            return;
        }

        let specs = fire_specs(alarm, now);
        let (backend, units) = match self.primary.request_authorization() {
            Authorization::Granted => {
                let scheduled = schedule_units(self.primary.as_ref(), &specs);
                if scheduled > 0 {
                    (BackendKind::Primary, scheduled)
                } else {
                    warn!(alarm_id = %alarm.id, "primary backend failed every unit, using fallback");
                    (
                        BackendKind::Fallback,
                        schedule_units(self.fallback.as_ref(), &specs),
                    )
                }
            }
            Authorization::Denied => {
                debug!(alarm_id = %alarm.id, "primary authorization denied, using fallback");
                (
                    BackendKind::Fallback,
                    schedule_units(self.fallback.as_ref(), &specs),
                )
            }
        };

        self.chosen
            .lock()
            .expect("chosen mutex poisoned")
            .insert(alarm.id, backend);
        self.set_state(alarm.id, ScheduleState::Scheduled);
        let _ = self.events.send(Event::AlarmScheduled {
            alarm_id: alarm.id,
            backend,
            units,
            at: now,
        });
    }

    /// Cancel-then-schedule. Safe to call repeatedly.
    pub fn reschedule(&self, alarm: &Alarm, now: DateTime<Utc>) {
        self.schedule(alarm, now);
    }

    /// Drop every live registration on *both* backends and forget the
    /// alarm. Which backend is active may be stale after a restart, so
    /// neither is trusted to be the only one holding a registration.
    pub fn cancel(&self, alarm_id: AlarmId) {
        self.cancel_on_both(alarm_id);
        self.chosen.lock().expect("chosen mutex poisoned").remove(&alarm_id);
        self.states.lock().expect("state mutex poisoned").remove(&alarm_id);
    }

    /// Request a countdown re-arm on whichever backend is active.
    pub fn snooze(&self, alarm_id: AlarmId, rearm_after: Duration) {
        let backend = self.active_backend(alarm_id);
        if let Err(err) = backend.snooze(alarm_id, rearm_after) {
            warn!(%alarm_id, %err, "snooze re-arm request failed");
            return;
        }
        self.set_state(alarm_id, ScheduleState::SnoozeCountdown);
    }

    /// Request immediate silence.
    pub fn stop(&self, alarm_id: AlarmId) {
        match self.chosen.lock().expect("chosen mutex poisoned").get(&alarm_id).copied() {
            Some(BackendKind::Primary) => self.primary.stop(alarm_id),
            Some(BackendKind::Fallback) => self.fallback.stop(alarm_id),
            // Stale belief: silence both.
            None => {
                self.primary.stop(alarm_id);
                self.fallback.stop(alarm_id);
            }
        }
        self.set_state(alarm_id, ScheduleState::Stopped);
    }

    /// Last observed state, if the alarm has one.
    pub fn state(&self, alarm_id: AlarmId) -> Option<ScheduleState> {
        self.states
            .lock()
            .expect("state mutex poisoned")
            .get(&alarm_id)
            .copied()
    }

    pub fn active_backend_kind(&self, alarm_id: AlarmId) -> Option<BackendKind> {
        self.chosen
            .lock()
            .expect("chosen mutex poisoned")
            .get(&alarm_id)
            .copied()
    }

    fn active_backend(&self, alarm_id: AlarmId) -> Arc<dyn AlertingBackend> {
        match self.active_backend_kind(alarm_id) {
            Some(BackendKind::Primary) => Arc::clone(&self.primary),
            _ => Arc::clone(&self.fallback),
        }
    }

    fn cancel_on_both(&self, alarm_id: AlarmId) {
        self.primary.cancel(alarm_id);
        self.fallback.cancel(alarm_id);
    }

    fn set_state(&self, alarm_id: AlarmId, state: ScheduleState) {
        self.states
            .lock()
            .expect("state mutex poisoned")
            .insert(alarm_id, state);
    }
}

/// Register each unit, retrying a failed unit once. A unit that fails
/// both attempts is logged and skipped; the others proceed.
fn schedule_units(backend: &dyn AlertingBackend, specs: &[FireSpec]) -> usize {
    let mut scheduled = 0;
    for spec in specs {
        let result = backend.schedule(spec).or_else(|err| {
            warn!(
                alarm_id = %spec.alarm_id,
                weekday = ?spec.weekday,
                %err,
                "unit registration failed, retrying"
            );
            backend.schedule(spec)
        });
        match result {
            Ok(()) => scheduled += 1,
            Err(err) => warn!(
                alarm_id = %spec.alarm_id,
                weekday = ?spec.weekday,
                %err,
                "unit registration failed twice, skipping this weekday"
            ),
        }
    }
    scheduled
}
