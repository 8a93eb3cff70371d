// Library interface for cyclecast modules
// This allows integration tests to access the core functionality

pub mod config;
pub mod database;
pub mod dates;
pub mod engine;
pub mod error;
pub mod export;
pub mod import;
pub mod logging;
pub mod models;
pub mod phase;
pub mod stats;
pub mod store;

// Re-export commonly used types for convenience
pub use models::*;
pub use database::SqliteStore;
pub use engine::CycleEngine;
pub use error::{CycleError, Result, StoreError, TransferError};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use phase::PhasePredictor;
pub use stats::CycleStatsCalculator;
pub use store::{MemoryStore, PeriodLogStore};
