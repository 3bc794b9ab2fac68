//! Backup Engine Library
//!
//! Change detection and job preparation for BigQuery and Cloud Storage
//! backups, plus the backup lifecycle state machine.

pub mod creator;
pub mod enumerator;
pub mod lifecycle;
pub mod models;
pub mod processor;
pub mod provider;
pub mod reconciler;
pub mod repository;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use creator::JobCreator;
pub use processor::ScheduleProcessor;
pub use repository::Repositories;
pub use utils::errors::{EngineError, ProviderError};
pub use utils::Result;
