//! Backup record: the unit of persisted lifecycle metadata.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::id::BackupId;
use crate::state::BackupState;
use crate::trigger::TriggerSource;

/// Classification of a backup payload, used as a scoring input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    SourceCode,
    Configuration,
    Data,
    Binary,
    Documentation,
    Temporary,
    Unknown,
}

impl std::fmt::Display for BackupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupKind::SourceCode => write!(f, "source-code"),
            BackupKind::Configuration => write!(f, "configuration"),
            BackupKind::Data => write!(f, "data"),
            BackupKind::Binary => write!(f, "binary"),
            BackupKind::Documentation => write!(f, "documentation"),
            BackupKind::Temporary => write!(f, "temporary"),
            BackupKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// One entry in a record's state history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    /// State entered.
    pub state: BackupState,

    /// When it was entered.
    pub timestamp: DateTime<Utc>,

    /// Trigger that drove the transition.
    pub trigger: TriggerSource,
}

/// A safety confidence value, clamped to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Confidence(f64);

impl Confidence {
    /// Clamp a raw value into [0, 1].
    pub fn new(value: f64) -> Self {
        Self(value.clamp(0.0, 1.0))
    }

    /// The inner value.
    pub fn value(self) -> f64 {
        self.0
    }

    /// Whether this confidence clears `threshold`.
    pub fn clears(self, threshold: f64) -> bool {
        self.0 >= threshold
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Persisted metadata (and payload reference) for one backup snapshot.
///
/// Records are created externally in `Created`, mutated only through the
/// coordinator, and tombstoned at `Deleted`. Confidence is never stored:
/// it is recomputed immediately before every destructive decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Immutable identifier.
    pub id: BackupId,

    /// When the backup was created.
    pub created_at: DateTime<Utc>,

    /// Version-control revision the payload was taken from, if known.
    pub source_revision: Option<String>,

    /// Payload size in bytes.
    pub size_bytes: u64,

    /// Payload classification.
    pub kind: BackupKind,

    /// Where the live payload resides before archival.
    pub payload_path: Option<PathBuf>,

    /// Current lifecycle state.
    pub state: BackupState,

    /// Last time the payload (or its source) was touched.
    pub last_accessed_at: DateTime<Utc>,

    /// Whether the originating work was merge-confirmed.
    #[serde(default)]
    pub merge_confirmed: bool,

    /// Count of test/build relationships referencing this backup.
    #[serde(default)]
    pub reference_count: u32,

    /// Whether dynamic/runtime usage of the payload was detected.
    #[serde(default)]
    pub dynamic_usage: bool,

    /// Archive location. Set exactly once, when the record reaches
    /// `Archived` with a verified copy.
    pub archive_path: Option<PathBuf>,

    /// Set after side-effect retries are exhausted; cleared by the next
    /// successful user-triggered transition.
    #[serde(default)]
    pub stuck: bool,

    /// Ordered transition history, oldest first.
    pub state_history: Vec<StateTransition>,

    /// Integrity hash over the identity-bearing fields, hex SHA-256.
    pub integrity: String,
}

impl BackupRecord {
    /// Create a record in the initial `Created` state.
    pub fn new(id: BackupId, size_bytes: u64, kind: BackupKind, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at,
            source_revision: None,
            size_bytes,
            kind,
            payload_path: None,
            state: BackupState::Created,
            last_accessed_at: created_at,
            merge_confirmed: false,
            reference_count: 0,
            dynamic_usage: false,
            archive_path: None,
            stuck: false,
            state_history: Vec::new(),
            integrity: String::new(),
        }
        .finalize()
    }

    /// Compute the integrity hash over the identity-bearing fields.
    pub fn calculate_integrity(&self) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(self.id.as_str().as_bytes());
        hasher.update(self.created_at.to_rfc3339().as_bytes());
        if let Some(rev) = &self.source_revision {
            hasher.update(rev.as_bytes());
        }
        hasher.update(self.size_bytes.to_le_bytes());
        hasher.update(self.state.to_string().as_bytes());
        hasher.update(self.last_accessed_at.to_rfc3339().as_bytes());
        hasher.update([
            self.merge_confirmed as u8,
            self.dynamic_usage as u8,
            self.stuck as u8,
        ]);
        hasher.update(self.reference_count.to_le_bytes());
        if let Some(path) = &self.archive_path {
            hasher.update(path.to_string_lossy().as_bytes());
        }
        hasher.update((self.state_history.len() as u64).to_le_bytes());
        if let Some(last) = self.state_history.last() {
            hasher.update(last.state.to_string().as_bytes());
            hasher.update(last.timestamp.to_rfc3339().as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Whether the stored integrity hash matches the fields.
    pub fn verify_integrity(&self) -> bool {
        self.integrity == self.calculate_integrity()
    }

    /// Recompute and store the integrity hash.
    pub fn finalize(mut self) -> Self {
        self.integrity = self.calculate_integrity();
        self
    }

    /// When the record entered its current state.
    pub fn entered_state_at(&self) -> DateTime<Utc> {
        self.state_history
            .last()
            .map(|t| t.timestamp)
            .unwrap_or(self.created_at)
    }

    /// How long the record has been in its current state.
    pub fn time_in_state(&self, now: DateTime<Utc>) -> Duration {
        now - self.entered_state_at()
    }

    /// Age since creation.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    /// Apply a committed transition: set the state, append to history,
    /// and refresh the integrity hash. Merge confirmation is latched
    /// when the confirmed state is entered.
    pub fn record_transition(
        &mut self,
        target: BackupState,
        trigger: TriggerSource,
        now: DateTime<Utc>,
    ) {
        self.state = target;
        if target == BackupState::Confirmed {
            self.merge_confirmed = true;
        }
        self.state_history.push(StateTransition {
            state: target,
            timestamp: now,
            trigger,
        });
        self.integrity = self.calculate_integrity();
    }

    /// Refresh the access timestamp (pre-push hook) and the hash.
    pub fn touch_access(&mut self, now: DateTime<Utc>) {
        self.last_accessed_at = now;
        self.integrity = self.calculate_integrity();
    }
}
