//! Enumerations shared by backups, jobs and source metadata.
//!
//! Every enum is stored as its variant name, so `as_str` and `FromStr` are
//! exact inverses. Parsing is case-insensitive.

use crate::utils::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackupType {
    BigQuery,
    CloudStorage,
}

impl BackupType {
    pub const ALL: [BackupType; 2] = [BackupType::BigQuery, BackupType::CloudStorage];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::BigQuery => "BigQuery",
            BackupType::CloudStorage => "CloudStorage",
        }
    }
}

/// Backup strategy. Unrecognized values are kept verbatim so that job
/// creators can reject them explicitly instead of failing at load time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    Snapshot,
    Mirror,
    Unknown(String),
}

impl Strategy {
    pub fn as_str(&self) -> &str {
        match self {
            Strategy::Snapshot => "Snapshot",
            Strategy::Mirror => "Mirror",
            Strategy::Unknown(s) => s,
        }
    }
}

impl From<&str> for Strategy {
    fn from(value: &str) -> Self {
        if value.eq_ignore_ascii_case("Snapshot") {
            Strategy::Snapshot
        } else if value.eq_ignore_ascii_case("Mirror") {
            Strategy::Mirror
        } else {
            Strategy::Unknown(value.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackupStatus {
    NotStarted,
    Prepared,
    Finished,
    Paused,
    ToDelete,
    BackupDeleted,
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStatus::NotStarted => "NotStarted",
            BackupStatus::Prepared => "Prepared",
            BackupStatus::Finished => "Finished",
            BackupStatus::Paused => "Paused",
            BackupStatus::ToDelete => "ToDelete",
            BackupStatus::BackupDeleted => "BackupDeleted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JobStatus {
    NotScheduled,
    Scheduled,
    Pending,
    Error,
    FinishedOk,
    FinishedError,
    FinishedQuotaError,
    JobDeleted,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::NotScheduled => "NotScheduled",
            JobStatus::Scheduled => "Scheduled",
            JobStatus::Pending => "Pending",
            JobStatus::Error => "Error",
            JobStatus::FinishedOk => "FinishedOk",
            JobStatus::FinishedError => "FinishedError",
            JobStatus::FinishedQuotaError => "FinishedQuotaError",
            JobStatus::JobDeleted => "JobDeleted",
        }
    }
}

/// Change classification of a source metadata row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Add,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Add => "Add",
            Operation::Update => "Update",
            Operation::Delete => "Delete",
        }
    }
}

fn parse_variant<T: Copy>(
    kind: &'static str,
    value: &str,
    variants: &[T],
    name: fn(&T) -> &'static str,
) -> Result<T, EngineError> {
    variants
        .iter()
        .find(|v| name(*v).eq_ignore_ascii_case(value))
        .copied()
        .ok_or_else(|| EngineError::InvalidValue {
            kind,
            value: value.to_string(),
        })
}

impl FromStr for BackupType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_variant("backup type", s, &BackupType::ALL, BackupType::as_str)
    }
}

impl FromStr for BackupStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use BackupStatus::*;
        parse_variant(
            "backup status",
            s,
            &[NotStarted, Prepared, Finished, Paused, ToDelete, BackupDeleted],
            BackupStatus::as_str,
        )
    }
}

impl FromStr for JobStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use JobStatus::*;
        parse_variant(
            "job status",
            s,
            &[
                NotScheduled,
                Scheduled,
                Pending,
                Error,
                FinishedOk,
                FinishedError,
                FinishedQuotaError,
                JobDeleted,
            ],
            JobStatus::as_str,
        )
    }
}

impl FromStr for Operation {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use Operation::*;
        parse_variant("operation", s, &[Add, Update, Delete], Operation::as_str)
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
