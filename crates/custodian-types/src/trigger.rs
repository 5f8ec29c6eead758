//! Trigger sources and request priorities.
//!
//! Four independent sources produce lifecycle transition requests:
//! version-control hooks, the time/age policy daemon, the disk pressure
//! monitor, and interactive user commands.

use serde::{Deserialize, Serialize};

/// Version-control hook entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookKind {
    /// After a commit lands.
    PostCommit,
    /// After a merge completes.
    PostMerge,
    /// Before a push is sent.
    PrePush,
}

impl std::fmt::Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookKind::PostCommit => write!(f, "post-commit"),
            HookKind::PostMerge => write!(f, "post-merge"),
            HookKind::PrePush => write!(f, "pre-push"),
        }
    }
}

/// Disk pressure classification from the free-space monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskLevel {
    /// Usage below every threshold.
    Normal,
    /// Usage crossed the warning threshold.
    Warning,
    /// Usage crossed the critical threshold.
    Critical,
    /// Usage crossed the emergency threshold.
    Emergency,
}

impl std::fmt::Display for DiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiskLevel::Normal => write!(f, "normal"),
            DiskLevel::Warning => write!(f, "warning"),
            DiskLevel::Critical => write!(f, "critical"),
            DiskLevel::Emergency => write!(f, "emergency"),
        }
    }
}

/// The source that produced a transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum TriggerSource {
    /// A version-control hook.
    GitHook {
        /// Which hook fired.
        event: HookKind,
    },

    /// The recurring time/age policy scan.
    Time,

    /// The disk pressure monitor.
    Disk {
        /// Pressure level at request time.
        level: DiskLevel,
    },

    /// An interactive user command.
    User,
}

impl TriggerSource {
    /// Dispatch priority for requests from this source.
    ///
    /// Contended requests are drained by priority, not arrival order:
    /// user commands outrank emergencies outrank routine policy.
    pub fn priority(&self) -> RequestPriority {
        match self {
            TriggerSource::User => RequestPriority::User,
            TriggerSource::Disk {
                level: DiskLevel::Emergency,
            } => RequestPriority::DiskEmergency,
            TriggerSource::Disk {
                level: DiskLevel::Critical,
            } => RequestPriority::DiskCritical,
            TriggerSource::Time => RequestPriority::TimePolicy,
            TriggerSource::GitHook { .. } => RequestPriority::GitHook,
            TriggerSource::Disk { .. } => RequestPriority::DiskWarning,
        }
    }
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerSource::GitHook { event } => write!(f, "git-hook:{}", event),
            TriggerSource::Time => write!(f, "time-policy"),
            TriggerSource::Disk { level } => write!(f, "disk:{}", level),
            TriggerSource::User => write!(f, "user"),
        }
    }
}

/// Dispatch priority of a transition request.
///
/// Ordering is ascending: a later variant outranks an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestPriority {
    /// Disk warning sweep, the least urgent source.
    DiskWarning,
    /// Version-control hook follow-up.
    GitHook,
    /// Routine time/age policy.
    TimePolicy,
    /// Disk critical sweep.
    DiskCritical,
    /// Disk emergency sweep.
    DiskEmergency,
    /// Explicit user command, highest priority.
    User,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ranking() {
        assert!(RequestPriority::User > RequestPriority::DiskEmergency);
        assert!(RequestPriority::DiskEmergency > RequestPriority::DiskCritical);
        assert!(RequestPriority::DiskCritical > RequestPriority::TimePolicy);
        assert!(RequestPriority::TimePolicy > RequestPriority::GitHook);
        assert!(RequestPriority::GitHook > RequestPriority::DiskWarning);
    }

    #[test]
    fn test_trigger_priority_mapping() {
        assert_eq!(TriggerSource::User.priority(), RequestPriority::User);
        assert_eq!(
            TriggerSource::Disk {
                level: DiskLevel::Emergency
            }
            .priority(),
            RequestPriority::DiskEmergency
        );
        assert_eq!(
            TriggerSource::Disk {
                level: DiskLevel::Warning
            }
            .priority(),
            RequestPriority::DiskWarning
        );
        assert_eq!(
            TriggerSource::GitHook {
                event: HookKind::PostCommit
            }
            .priority(),
            RequestPriority::GitHook
        );
    }

    #[test]
    fn test_trigger_display() {
        let t = TriggerSource::GitHook {
            event: HookKind::PostMerge,
        };
        assert_eq!(t.to_string(), "git-hook:post-merge");
        assert_eq!(TriggerSource::Time.to_string(), "time-policy");
    }
}
