//! Registry trait and the file-backed implementation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use custodian_types::{BackupId, BackupRecord, BackupState, EngineError, EngineResult};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Predicate over records for filtered listings.
pub type RecordPredicate = dyn Fn(&BackupRecord) -> bool + Send + Sync;

/// Keyed store of backup records.
///
/// All reads and writes in the system pass through this trait; the
/// coordinator re-reads through it rather than trusting any caller's
/// view of a record.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Fetch one record. A record failing its integrity check is
    /// quarantined and reported as `CorruptionDetected`.
    async fn get(&self, id: &BackupId) -> EngineResult<BackupRecord>;

    /// List records matching a predicate. Corrupt records are
    /// quarantined and skipped; they never fail the listing.
    async fn list(&self, predicate: &RecordPredicate) -> EngineResult<Vec<BackupRecord>>;

    /// Persist a record atomically (write-new, then publish).
    async fn put(&self, record: &BackupRecord) -> EngineResult<()>;

    /// List records currently in `state`.
    async fn list_in_state(&self, state: BackupState) -> EngineResult<Vec<BackupRecord>> {
        self.list(&move |r: &BackupRecord| r.state == state).await
    }
}

/// File-backed registry: one JSON document per record under
/// `<root>/records/`, quarantined files under `<root>/quarantine/`.
pub struct FileRegistry {
    records_dir: PathBuf,
    quarantine_dir: PathBuf,
}

impl FileRegistry {
    /// Open (creating directories as needed) a registry rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> EngineResult<Self> {
        let root = root.as_ref();
        let records_dir = root.join("records");
        let quarantine_dir = root.join("quarantine");
        tokio::fs::create_dir_all(&records_dir).await?;
        tokio::fs::create_dir_all(&quarantine_dir).await?;

        Ok(Self {
            records_dir,
            quarantine_dir,
        })
    }

    fn record_path(&self, id: &BackupId) -> PathBuf {
        self.records_dir.join(format!("{}.json", id))
    }

    /// Move a corrupt record file aside so it is excluded from all
    /// further automatic processing but kept for repair.
    async fn quarantine(&self, path: &Path) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string());
        let target = self.quarantine_dir.join(name);

        warn!(file = %path.display(), "Quarantining corrupt record");
        if let Err(e) = tokio::fs::rename(path, &target).await {
            warn!(file = %path.display(), error = %e, "Failed to quarantine record");
        }
    }

    async fn read_record(&self, path: &Path) -> EngineResult<BackupRecord> {
        let bytes = tokio::fs::read(path).await?;
        let record: BackupRecord = serde_json::from_slice(&bytes)?;
        Ok(record)
    }
}

#[async_trait]
impl Registry for FileRegistry {
    async fn get(&self, id: &BackupId) -> EngineResult<BackupRecord> {
        let path = self.record_path(id);
        if !path.exists() {
            return Err(EngineError::NotFound(id.clone()));
        }

        let record = match self.read_record(&path).await {
            Ok(record) => record,
            Err(EngineError::Serialization(_)) => {
                self.quarantine(&path).await;
                return Err(EngineError::CorruptionDetected(id.clone()));
            }
            Err(e) => return Err(e),
        };

        if !record.verify_integrity() {
            self.quarantine(&path).await;
            return Err(EngineError::CorruptionDetected(id.clone()));
        }

        Ok(record)
    }

    async fn list(&self, predicate: &RecordPredicate) -> EngineResult<Vec<BackupRecord>> {
        let mut records = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.records_dir).await?;

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }

            // A corrupt record is quarantined and skipped; the rest of
            // the listing is unaffected.
            match self.read_record(&path).await {
                Ok(record) if record.verify_integrity() => {
                    if predicate(&record) {
                        records.push(record);
                    }
                }
                Ok(_) | Err(EngineError::Serialization(_)) => {
                    self.quarantine(&path).await;
                }
                Err(e) => return Err(e),
            }
        }

        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    async fn put(&self, record: &BackupRecord) -> EngineResult<()> {
        if !record.verify_integrity() {
            return Err(EngineError::Validation(format!(
                "refusing to persist record {} with a stale integrity hash",
                record.id
            )));
        }

        let path = self.record_path(&record.id);
        let tmp = self.records_dir.join(format!("{}.json.tmp", record.id));
        let json = serde_json::to_vec_pretty(record)?;

        // Write-new then publish: a reader never observes a partial record.
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &path).await?;

        debug!(backup_id = %record.id, state = %record.state, "Persisted record");
        Ok(())
    }
}
