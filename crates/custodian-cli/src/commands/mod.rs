//! Command implementations.

pub mod audit;
pub mod hook;
pub mod lifecycle;

use custodian_types::{Outcome, RejectCause, TransitionResult};

/// Exit codes for the CLI surface: 0 success, 1 validation error,
/// 2 busy/lock timeout, 3 low-confidence rejection.
pub fn exit_code_for(result: &TransitionResult) -> i32 {
    match (&result.outcome, &result.cause) {
        (Outcome::Committed, _) => 0,
        (_, Some(RejectCause::Busy)) => 2,
        (_, Some(RejectCause::LowConfidence { .. })) => 3,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodian_types::BackupState;

    #[test]
    fn test_exit_codes() {
        let committed = TransitionResult::committed(BackupState::Deleted, None);
        assert_eq!(exit_code_for(&committed), 0);

        let busy = TransitionResult::rejected(RejectCause::Busy, BackupState::Cleanable, None);
        assert_eq!(exit_code_for(&busy), 2);

        let low = TransitionResult::rejected(
            RejectCause::LowConfidence {
                confidence: 0.4,
                threshold: 0.9,
            },
            BackupState::Cleanable,
            None,
        );
        assert_eq!(exit_code_for(&low), 3);

        let invalid = TransitionResult::rejected(
            RejectCause::InvalidTransition {
                from: BackupState::Created,
                to: BackupState::Archived,
            },
            BackupState::Created,
            None,
        );
        assert_eq!(exit_code_for(&invalid), 1);
    }
}
