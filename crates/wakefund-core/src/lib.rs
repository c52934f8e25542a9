//! # Wakefund Core Library
//!
//! Core business logic for Wakefund, the alarm clock where snoozing
//! costs an escalating donation. All operations are available through
//! the [`AlarmService`] facade; UI layers are thin shells over this
//! library.
//!
//! ## Architecture
//!
//! - **Alarm registry**: canonical alarm collection, persisted as whole
//!   snapshots on every mutation
//! - **Snooze economy**: tiered escalating charges, per-day ceiling,
//!   streak bookkeeping, cleared through an external payment authority
//! - **Statistics ledger**: append-only snooze transaction log plus
//!   derived donation aggregates with periodic rollover
//! - **Scheduling coordinator**: primary/fallback alerting backends,
//!   per-weekday registration, asynchronous state confirmations
//! - **Sync reconciler**: lossless snapshot merge across devices
//!
//! ## Key Components
//!
//! - [`AlarmService`]: the single entry point for callers
//! - [`SnoozeEconomyEngine`]: cost tiers and ceiling enforcement
//! - [`SchedulingCoordinator`]: backend selection and the state machine
//! - [`SyncReconciler`]: pull-merge-push against a remote snapshot

pub mod alarm;
pub mod economy;
pub mod error;
pub mod events;
pub mod ledger;
pub mod registry;
pub mod scheduling;
pub mod service;
pub mod storage;
pub mod sync;

pub use alarm::{Alarm, AlarmId, AlarmTime};
pub use economy::{
    ChargeOutcome, DismissSummary, PaymentAuthority, SnoozeEconomyEngine, SnoozeGrant,
    SnoozeRejection,
};
pub use error::{ConfigError, CoreError, ScheduleError, StoreError, ValidationError};
pub use events::Event;
pub use ledger::{DonationStats, SnoozeRecord, StatisticsLedger};
pub use registry::AlarmRegistry;
pub use scheduling::{
    AlertingBackend, Authorization, BackendEvent, BackendKind, FireSpec, ScheduleState,
    SchedulingCoordinator,
};
pub use service::AlarmService;
pub use storage::{Config, MemoryStore, SnapshotKind, SnapshotStore, SqliteStore};
pub use sync::{Snapshot, SyncError, SyncReconciler, SyncService, SyncStatus};
