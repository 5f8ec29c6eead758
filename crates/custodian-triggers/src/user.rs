//! User command trigger.
//!
//! Builds requests for the interactive CLI surface. `dry_run` simulates
//! without committing; `force` bypasses the confidence gate but never
//! edge legality or integrity checks. The confirmation prompt itself
//! lives in the CLI; this adapter only shapes requests.

use custodian_types::{BackupId, BackupState, TransitionRequest, TriggerSource};

/// Request builders for user commands.
pub struct UserTrigger;

impl UserTrigger {
    /// `confirm`: manually confirm a pending backup.
    pub fn confirm(backup_id: BackupId) -> TransitionRequest {
        TransitionRequest::new(backup_id, BackupState::Confirmed, TriggerSource::User)
    }

    /// `cleanup`: delete a cleanable backup through the confidence gate.
    pub fn cleanup(backup_id: BackupId, dry_run: bool) -> TransitionRequest {
        let request =
            TransitionRequest::new(backup_id, BackupState::Deleted, TriggerSource::User);
        if dry_run {
            request.with_dry_run()
        } else {
            request
        }
    }

    /// `archive`: move a cleanable backup to archival storage.
    pub fn archive(backup_id: BackupId, dry_run: bool) -> TransitionRequest {
        let request =
            TransitionRequest::new(backup_id, BackupState::Archived, TriggerSource::User);
        if dry_run {
            request.with_dry_run()
        } else {
            request
        }
    }

    /// `force-cleanup`: delete bypassing the confidence gate. The CLI
    /// obtains explicit confirmation before submitting this.
    pub fn force_cleanup(backup_id: BackupId) -> TransitionRequest {
        TransitionRequest::new(backup_id, BackupState::Deleted, TriggerSource::User).with_force()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodian_types::RequestPriority;

    #[test]
    fn test_cleanup_request_shape() {
        let request = UserTrigger::cleanup(BackupId::new("b1"), false);
        assert_eq!(request.target, BackupState::Deleted);
        assert_eq!(request.priority, RequestPriority::User);
        assert!(!request.force);
        assert!(!request.dry_run);
    }

    #[test]
    fn test_dry_run_flag_carries_through() {
        assert!(UserTrigger::cleanup(BackupId::new("b1"), true).dry_run);
        assert!(UserTrigger::archive(BackupId::new("b1"), true).dry_run);
    }

    #[test]
    fn test_force_cleanup_is_forced_and_valid() {
        let request = UserTrigger::force_cleanup(BackupId::new("b1"));
        assert!(request.force);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_confirm_targets_confirmed() {
        let request = UserTrigger::confirm(BackupId::new("b1"));
        assert_eq!(request.target, BackupState::Confirmed);
    }
}
