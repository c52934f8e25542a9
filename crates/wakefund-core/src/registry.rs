//! Canonical alarm collection.
//!
//! The registry is the single owner of `Alarm` entities. Every mutation
//! rewrites the whole collection snapshot in the durable store, so a
//! crash mid-write can never leave a half-updated record.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::alarm::{Alarm, AlarmId};
use crate::error::{CoreError, Result, StoreError};
use crate::storage::{save_with_retry, SnapshotKind, SnapshotStore};

pub struct AlarmRegistry {
    alarms: HashMap<AlarmId, Alarm>,
    store: Arc<dyn SnapshotStore>,
}

impl AlarmRegistry {
    /// Load the registry from the store, starting empty when no snapshot
    /// exists yet.
    pub fn load(store: Arc<dyn SnapshotStore>) -> Result<Self, StoreError> {
        let alarms: Vec<Alarm> = match store.load(SnapshotKind::Alarms)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::ReadFailed(e.to_string()))?,
            None => Vec::new(),
        };
        Ok(Self {
            alarms: alarms.into_iter().map(|a| (a.id, a)).collect(),
            store,
        })
    }

    /// Insert a new alarm. Rejects an id the registry already holds.
    pub fn create(&mut self, alarm: Alarm) -> Result<()> {
        alarm.validate()?;
        if self.alarms.contains_key(&alarm.id) {
            return Err(StoreError::DuplicateId(alarm.id).into());
        }
        self.alarms.insert(alarm.id, alarm);
        self.persist();
        Ok(())
    }

    /// Replace an existing alarm with an edited copy, bumping its
    /// modification timestamp.
    ///
    /// The snooze fields and `created_at` are carried over from the
    /// stored entry, never taken from the caller's copy: only the
    /// economy engine mutates snooze bookkeeping, and an edit built from
    /// a stale copy must not reset today's count (that would re-open the
    /// per-day ceiling).
    ///
    /// Unknown ids are a deliberate no-op: a concurrent delete racing an
    /// edit is an expected interleaving, not a failure.
    pub fn update(&mut self, mut alarm: Alarm) -> Result<()> {
        alarm.validate()?;
        match self.alarms.get_mut(&alarm.id) {
            Some(existing) => {
                alarm.snooze_count = existing.snooze_count;
                alarm.last_snooze_at = existing.last_snooze_at;
                alarm.created_at = existing.created_at;
                alarm.touch();
                *existing = alarm;
                self.persist();
            }
            None => debug!(id = %alarm.id, "update for unknown alarm ignored"),
        }
        Ok(())
    }

    /// Flip the enabled flag. No-op on unknown ids, same as `update`.
    /// Returns the new enabled state when the alarm exists.
    pub fn toggle(&mut self, id: AlarmId) -> Option<bool> {
        match self.alarms.get_mut(&id) {
            Some(alarm) => {
                alarm.enabled = !alarm.enabled;
                alarm.touch();
                let enabled = alarm.enabled;
                self.persist();
                Some(enabled)
            }
            None => {
                debug!(%id, "toggle for unknown alarm ignored");
                None
            }
        }
    }

    /// Remove an alarm. Returns the removed entity if it existed.
    pub fn delete(&mut self, id: AlarmId) -> Option<Alarm> {
        let removed = self.alarms.remove(&id);
        if removed.is_some() {
            self.persist();
        }
        removed
    }

    pub fn get(&self, id: AlarmId) -> Option<&Alarm> {
        self.alarms.get(&id)
    }

    /// All alarms, oldest first.
    pub fn list(&self) -> Vec<Alarm> {
        let mut alarms: Vec<Alarm> = self.alarms.values().cloned().collect();
        alarms.sort_by_key(|a| a.created_at);
        alarms
    }

    /// Mutable access for the snooze economy engine, which owns the
    /// snooze-count/last-snooze fields. Callers must follow with
    /// [`persist_after_engine_mutation`](Self::persist_after_engine_mutation).
    pub(crate) fn get_mut(&mut self, id: AlarmId) -> Option<&mut Alarm> {
        self.alarms.get_mut(&id)
    }

    pub(crate) fn alarms_mut(&mut self) -> impl Iterator<Item = &mut Alarm> {
        self.alarms.values_mut()
    }

    pub(crate) fn persist_after_engine_mutation(&self) {
        self.persist();
    }

    /// Install the merged alarm set produced by the sync reconciler.
    pub fn replace_all(&mut self, alarms: Vec<Alarm>) {
        self.alarms = alarms.into_iter().map(|a| (a.id, a)).collect();
        self.persist();
    }

    fn persist(&self) {
        let snapshot = self.list();
        save_with_retry(self.store.as_ref(), SnapshotKind::Alarms, &snapshot);
    }
}
