//! Error types for the backup engine.

use crate::models::BackupStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("unsupported strategy {0}")]
    UnsupportedStrategy(String),

    #[error("backup status update not allowed from {from} to {to}")]
    InvalidTransition { from: BackupStatus, to: BackupStatus },

    #[error("backup with id {0} not found")]
    BackupNotFound(String),

    #[error("bucket {0} not found")]
    BucketNotFound(String),

    #[error("no source metadata was added for backup {backup_id} and table {table}")]
    MissingSourceMetadata { backup_id: String, table: String },

    #[error("invalid value {value:?} for {kind}")]
    InvalidValue { kind: &'static str, value: String },

    #[error("pass was cancelled")]
    Cancelled,

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Repository error: {0:#}")]
    Repository(#[from] anyhow::Error),
}

/// Failure reported by a cloud resource provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The addressed resource does not exist (HTTP 404 class).
    #[error("resource {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProviderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
