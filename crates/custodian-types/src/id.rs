//! Identifier newtypes.

use serde::{Deserialize, Serialize};

/// Identifier of a backup record.
///
/// Assigned once when the backup is created and never changes across
/// lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackupId(String);

impl BackupId {
    /// Create an ID from an existing string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new random backup ID.
    pub fn generate() -> Self {
        Self(format!("backup-{}", uuid::Uuid::new_v4()))
    }

    /// Get the ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the ID is empty (malformed request).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for BackupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a lock holder: the OS process plus a per-process instance
/// token, so a recycled pid cannot masquerade as a live holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderId {
    /// OS process ID of the holder.
    pub pid: u32,

    /// Instance token, unique per holder process lifetime.
    pub instance: uuid::Uuid,
}

impl HolderId {
    /// Identity for the current process.
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            instance: uuid::Uuid::new_v4(),
        }
    }
}

impl std::fmt::Display for HolderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.pid, self.instance)
    }
}
