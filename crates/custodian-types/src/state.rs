//! Backup lifecycle state machine.
//!
//! The transition graph is the single authority on which lifecycle edges
//! exist and which trigger may drive each of them. Everything outside
//! this module asks `can_transition_to`; nothing else encodes edges.

use crate::trigger::{HookKind, TriggerSource};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a backup record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupState {
    /// Freshly created by the backup-creation collaborator.
    Created,
    /// A commit referencing the backed-up work has landed.
    Pending,
    /// The work was merged; the backup is confirmed reproducible.
    Confirmed,
    /// Eligible for archive or deletion under policy.
    Cleanable,
    /// Payload moved to archival storage, integrity verified.
    Archived,
    /// Terminal tombstone: payload purged, metadata retained.
    Deleted,
}

impl BackupState {
    /// Whether this state admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, BackupState::Deleted)
    }

    /// Whether transitioning *into* `target` destroys or displaces the
    /// payload and therefore passes the confidence gate.
    pub fn is_destructive_target(target: BackupState) -> bool {
        matches!(target, BackupState::Archived | BackupState::Deleted)
    }

    /// Whether `trigger` may drive this state to `target`.
    ///
    /// `force` only widens the graph for explicit user deletion: any
    /// non-terminal state may be force-deleted. Force never legalizes
    /// other edges and never bypasses integrity checks (those live in
    /// the registry read path).
    pub fn can_transition_to(self, target: BackupState, trigger: &TriggerSource, force: bool) -> bool {
        if force
            && matches!(trigger, TriggerSource::User)
            && target == BackupState::Deleted
            && !self.is_terminal()
        {
            return true;
        }

        match (self, target) {
            (BackupState::Created, BackupState::Pending) => matches!(
                trigger,
                TriggerSource::GitHook {
                    event: HookKind::PostCommit
                }
            ),
            (BackupState::Pending, BackupState::Confirmed) => matches!(
                trigger,
                TriggerSource::GitHook {
                    event: HookKind::PostMerge
                } | TriggerSource::User
            ),
            // Abandonment: no merge arrived within the policy window.
            (BackupState::Pending, BackupState::Cleanable) => {
                matches!(trigger, TriggerSource::Time)
            }
            (BackupState::Confirmed, BackupState::Cleanable) => {
                matches!(trigger, TriggerSource::Time | TriggerSource::Disk { .. })
            }
            (BackupState::Cleanable, BackupState::Archived) => {
                matches!(trigger, TriggerSource::Time | TriggerSource::User)
            }
            (BackupState::Cleanable, BackupState::Deleted) => matches!(
                trigger,
                TriggerSource::Time | TriggerSource::Disk { .. } | TriggerSource::User
            ),
            (BackupState::Archived, BackupState::Deleted) => {
                matches!(trigger, TriggerSource::Time | TriggerSource::User)
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for BackupState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupState::Created => write!(f, "created"),
            BackupState::Pending => write!(f, "pending"),
            BackupState::Confirmed => write!(f, "confirmed"),
            BackupState::Cleanable => write!(f, "cleanable"),
            BackupState::Archived => write!(f, "archived"),
            BackupState::Deleted => write!(f, "deleted"),
        }
    }
}
