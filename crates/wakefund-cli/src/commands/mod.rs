pub mod alarm;
pub mod config;
pub mod stats;
pub mod sync;
