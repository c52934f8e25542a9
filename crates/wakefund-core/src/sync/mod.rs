//! Cross-device snapshot synchronization.
//!
//! A remote service holds the other device's snapshot; the reconciler
//! pulls it, merges without losing data from either side, and pushes the
//! result back. Sync is strictly non-fatal: any failure surfaces as
//! status while local operation continues unaffected.

pub mod reconciler;
pub mod types;


pub use reconciler::{merge, SyncReconciler};
pub use types::{Snapshot, SyncError, SyncService, SyncStatus};
