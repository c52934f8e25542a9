pub mod config;
pub mod store;

pub use config::Config;
pub use store::{MemoryStore, SnapshotKind, SnapshotStore, SqliteStore};

pub(crate) use store::save_with_retry;

use std::path::PathBuf;

/// Returns `~/.config/wakefund[-dev]/` based on WAKEFUND_ENV.
///
/// Set WAKEFUND_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if the home directory cannot be determined or if
/// creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("WAKEFUND_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("wakefund-dev")
    } else {
        base_dir.join("wakefund")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
