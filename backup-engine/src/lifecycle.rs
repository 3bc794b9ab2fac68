//! Backup lifecycle state machine.
//!
//! Transitions are validated before anything is written; a rejected request
//! leaves the backup untouched.

use crate::models::BackupStatus;
use crate::utils::{EngineError, Result};

/// Statuses reachable from `from` in one step.
pub fn allowed_targets(from: BackupStatus) -> &'static [BackupStatus] {
    use BackupStatus::*;
    match from {
        NotStarted => &[Prepared, Finished, Paused, ToDelete, BackupDeleted],
        Prepared => &[NotStarted, Finished, Paused, ToDelete, BackupDeleted],
        Finished => &[NotStarted, Paused, ToDelete, BackupDeleted],
        Paused => &[NotStarted, ToDelete, BackupDeleted],
        ToDelete => &[NotStarted, BackupDeleted],
        BackupDeleted => &[NotStarted],
    }
}

pub fn is_transition_valid(from: BackupStatus, to: BackupStatus) -> bool {
    allowed_targets(from).contains(&to)
}

/// Validate `from -> to`, returning the target status on success.
pub fn transition(from: BackupStatus, to: BackupStatus) -> Result<BackupStatus> {
    if is_transition_valid(from, to) {
        Ok(to)
    } else {
        Err(EngineError::InvalidTransition { from, to })
    }
}

/// Status a backup takes after its jobs were prepared.
///
/// Recurring backups are prepared again on every run, so staying in
/// `Prepared` is accepted as a no-op rather than a transition.
pub fn prepared_from(current: BackupStatus) -> Result<BackupStatus> {
    if current == BackupStatus::Prepared {
        return Ok(current);
    }
    transition(current, BackupStatus::Prepared)
}

/// Target of a deletion request. Backups that never started skip the
/// `ToDelete` stage since there is no sink data to clean up.
pub fn deletion_target(current: BackupStatus) -> Result<BackupStatus> {
    match current {
        BackupStatus::NotStarted => transition(current, BackupStatus::BackupDeleted),
        _ => transition(current, BackupStatus::ToDelete),
    }
}
