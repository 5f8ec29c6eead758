//! Append-only audit log with hash chaining.
//!
//! One entry is written per coordinator submit call, accepted or
//! rejected. Entries chain through SHA-256 hashes so tampering with the
//! log is detectable after the fact.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use custodian_types::{
    BackupId, BackupState, Confidence, EngineError, EngineResult, Outcome, RejectCause,
    TriggerSource,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

/// One audit record, finalized with its chain hashes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry ID.
    pub id: Uuid,

    /// When the decision was made.
    pub timestamp: DateTime<Utc>,

    /// Backup the request targeted.
    pub backup_id: BackupId,

    /// Source that produced the request.
    pub trigger: TriggerSource,

    /// State the record was in when the request was evaluated.
    pub from: BackupState,

    /// Requested target state.
    pub requested: BackupState,

    /// Committed or rejected.
    pub outcome: Outcome,

    /// State after the call.
    pub new_state: BackupState,

    /// Confidence at decision time, when one was computed.
    pub confidence: Option<Confidence>,

    /// Rejection cause, if rejected.
    pub cause: Option<RejectCause>,

    /// Whether the request was a simulation.
    pub dry_run: bool,

    /// Hash of the previous entry, hex SHA-256.
    pub previous_hash: Option<String>,

    /// Hash of this entry, hex SHA-256.
    pub entry_hash: String,
}

/// An entry before it is chained by a sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialAuditEntry {
    pub timestamp: DateTime<Utc>,
    pub backup_id: BackupId,
    pub trigger: TriggerSource,
    pub from: BackupState,
    pub requested: BackupState,
    pub outcome: Outcome,
    pub new_state: BackupState,
    pub confidence: Option<Confidence>,
    pub cause: Option<RejectCause>,
    pub dry_run: bool,
}

impl PartialAuditEntry {
    /// Finalize with the chain's previous hash.
    pub fn finalize(self, previous_hash: Option<String>) -> AuditEntry {
        use sha2::{Digest, Sha256};

        let id = Uuid::new_v4();
        let mut hasher = Sha256::new();
        hasher.update(id.as_bytes());
        hasher.update(self.timestamp.to_rfc3339().as_bytes());
        hasher.update(self.backup_id.as_str().as_bytes());
        hasher.update(self.trigger.to_string().as_bytes());
        hasher.update(self.from.to_string().as_bytes());
        hasher.update(self.requested.to_string().as_bytes());
        hasher.update(self.new_state.to_string().as_bytes());
        hasher.update(serde_json::to_string(&self.outcome).unwrap_or_default().as_bytes());
        hasher.update(serde_json::to_string(&self.cause).unwrap_or_default().as_bytes());
        hasher.update([self.dry_run as u8]);
        hasher.update(previous_hash.as_deref().unwrap_or("").as_bytes());
        let entry_hash = hex::encode(hasher.finalize());

        AuditEntry {
            id,
            timestamp: self.timestamp,
            backup_id: self.backup_id,
            trigger: self.trigger,
            from: self.from,
            requested: self.requested,
            outcome: self.outcome,
            new_state: self.new_state,
            confidence: self.confidence,
            cause: self.cause,
            dry_run: self.dry_run,
            previous_hash,
            entry_hash,
        }
    }
}

/// Chain state carried between appends.
#[derive(Debug, Default)]
struct ChainState {
    previous_hash: Option<String>,
    count: u64,
}

/// Sink for audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Chain and persist an entry.
    async fn append(&self, entry: PartialAuditEntry) -> EngineResult<AuditEntry>;

    /// Number of entries written.
    async fn entry_count(&self) -> EngineResult<u64>;
}

/// In-memory sink for tests.
#[derive(Default)]
pub struct MemoryAuditSink {
    entries: RwLock<Vec<AuditEntry>>,
    chain: RwLock<ChainState>,
}

impl MemoryAuditSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries appended so far.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, partial: PartialAuditEntry) -> EngineResult<AuditEntry> {
        let mut chain = self.chain.write();
        let entry = partial.finalize(chain.previous_hash.clone());
        chain.previous_hash = Some(entry.entry_hash.clone());
        chain.count += 1;
        drop(chain);

        self.entries.write().push(entry.clone());
        Ok(entry)
    }

    async fn entry_count(&self) -> EngineResult<u64> {
        Ok(self.chain.read().count)
    }
}

/// Append-only JSONL file sink.
pub struct FileAuditSink {
    path: PathBuf,
    chain: Arc<RwLock<ChainState>>,
}

impl FileAuditSink {
    /// Open the sink, resuming the chain from an existing log.
    pub async fn open(path: PathBuf) -> EngineResult<Self> {
        let chain = if path.exists() {
            let entries = Self::read_entries(&path).await?;
            ChainState {
                previous_hash: entries.last().map(|e| e.entry_hash.clone()),
                count: entries.len() as u64,
            }
        } else {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            ChainState::default()
        };

        Ok(Self {
            path,
            chain: Arc::new(RwLock::new(chain)),
        })
    }

    /// The log file path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Read every entry in the log.
    pub async fn read_all(&self) -> EngineResult<Vec<AuditEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        Self::read_entries(&self.path).await
    }

    async fn read_entries(path: &PathBuf) -> EngineResult<Vec<AuditEntry>> {
        let file = File::open(path).await?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut entries = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }

        Ok(entries)
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn append(&self, partial: PartialAuditEntry) -> EngineResult<AuditEntry> {
        // Scope the chain lock so it is not held across file IO.
        let (entry, json) = {
            let mut chain = self.chain.write();
            let entry = partial.finalize(chain.previous_hash.clone());
            chain.previous_hash = Some(entry.entry_hash.clone());
            chain.count += 1;
            let json = serde_json::to_string(&entry)?;
            (entry, json)
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(json.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;

        Ok(entry)
    }

    async fn entry_count(&self) -> EngineResult<u64> {
        Ok(self.chain.read().count)
    }
}

/// Verify an entry sequence chains correctly. Returns the index of the
/// first broken link, or `Ok(())` when the chain is intact.
pub fn verify_chain(entries: &[AuditEntry]) -> EngineResult<()> {
    let mut previous: Option<&str> = None;
    for (index, entry) in entries.iter().enumerate() {
        if entry.previous_hash.as_deref() != previous {
            return Err(EngineError::Validation(format!(
                "audit chain broken at entry {index}: previous hash mismatch"
            )));
        }
        previous = Some(entry.entry_hash.as_str());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(backup: &str) -> PartialAuditEntry {
        PartialAuditEntry {
            timestamp: Utc::now(),
            backup_id: BackupId::new(backup),
            trigger: TriggerSource::User,
            from: BackupState::Cleanable,
            requested: BackupState::Deleted,
            outcome: Outcome::Committed,
            new_state: BackupState::Deleted,
            confidence: Some(Confidence::new(0.92)),
            cause: None,
            dry_run: false,
        }
    }

    #[tokio::test]
    async fn test_memory_sink_chains() {
        let sink = MemoryAuditSink::new();
        let first = sink.append(partial("b1")).await.unwrap();
        let second = sink.append(partial("b2")).await.unwrap();

        assert_eq!(sink.entry_count().await.unwrap(), 2);
        assert!(first.previous_hash.is_none());
        assert_eq!(second.previous_hash, Some(first.entry_hash.clone()));
        verify_chain(&sink.entries()).unwrap();
    }

    #[tokio::test]
    async fn test_file_sink_persists_and_resumes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        {
            let sink = FileAuditSink::open(path.clone()).await.unwrap();
            sink.append(partial("b1")).await.unwrap();
            sink.append(partial("b2")).await.unwrap();
        }

        // Reopen and continue the chain.
        let sink = FileAuditSink::open(path.clone()).await.unwrap();
        assert_eq!(sink.entry_count().await.unwrap(), 2);
        sink.append(partial("b3")).await.unwrap();

        let entries = sink.read_all().await.unwrap();
        assert_eq!(entries.len(), 3);
        verify_chain(&entries).unwrap();
    }

    #[tokio::test]
    async fn test_tampered_chain_is_detected() {
        let sink = MemoryAuditSink::new();
        sink.append(partial("b1")).await.unwrap();
        sink.append(partial("b2")).await.unwrap();

        let mut entries = sink.entries();
        entries[0].entry_hash = "0".repeat(64);
        assert!(verify_chain(&entries).is_err());
    }

    #[tokio::test]
    async fn test_rejected_entry_carries_cause() {
        let sink = MemoryAuditSink::new();
        let mut p = partial("b1");
        p.outcome = Outcome::Rejected;
        p.new_state = BackupState::Cleanable;
        p.cause = Some(RejectCause::LowConfidence {
            confidence: 0.4,
            threshold: 0.9,
        });

        let entry = sink.append(p).await.unwrap();
        assert_eq!(entry.outcome, Outcome::Rejected);
        assert!(matches!(
            entry.cause,
            Some(RejectCause::LowConfidence { .. })
        ));
    }
}
