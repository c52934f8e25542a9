//! Shared-file synchronization command.
//!
//! The remote side is a JSON snapshot file on a path both devices can
//! reach (a synced folder, a network mount). Each `sync now` pulls the
//! file, merges it with local state, and pushes the merged snapshot
//! back.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::Subcommand;

use wakefund_core::{Snapshot, SyncError, SyncReconciler, SyncService};

use crate::wiring::{self, CliResult};

#[derive(Subcommand)]
pub enum SyncAction {
    /// Run one pull-merge-push cycle against a snapshot file
    Now {
        /// Path to the shared snapshot file
        file: PathBuf,
    },
}

pub fn run(action: SyncAction) -> CliResult {
    match action {
        SyncAction::Now { file } => {
            let service = wiring::service()?;
            let reconciler = SyncReconciler::new(service, Arc::new(FileRemote { path: file }));
            let status = reconciler.run_once()?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }
    Ok(())
}

/// Snapshot-file transport. A missing file reads as an empty snapshot,
/// so the first sync from a fresh device seeds it.
struct FileRemote {
    path: PathBuf,
}

impl SyncService for FileRemote {
    fn pull(&self) -> Result<Snapshot, SyncError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Snapshot {
                alarms: Vec::new(),
                records: Vec::new(),
                stats: Default::default(),
                taken_at: Utc::now(),
            }),
            Err(err) => Err(SyncError::Io(err)),
        }
    }

    fn push(&self, snapshot: &Snapshot) -> Result<(), SyncError> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}
