//! Pre-transition checkpoints.
//!
//! Before a side effect runs, the coordinator snapshots the record to a
//! checkpoint file. If the side effect fails (or the process crashes
//! mid-transition), the record is restored from the checkpoint; a
//! leftover checkpoint found at startup marks an interrupted transition
//! to recover.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use custodian_types::{BackupId, BackupRecord, EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// A persisted pre-transition snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Record as it was before the transition began.
    pub record: BackupRecord,

    /// When the checkpoint was taken.
    pub created_at: DateTime<Utc>,

    /// Checksum over the serialized record, hex SHA-256.
    pub checksum: String,
}

impl Checkpoint {
    fn new(record: BackupRecord, created_at: DateTime<Utc>) -> EngineResult<Self> {
        let checksum = Self::checksum_of(&record)?;
        Ok(Self {
            record,
            created_at,
            checksum,
        })
    }

    fn checksum_of(record: &BackupRecord) -> EngineResult<String> {
        use sha2::{Digest, Sha256};
        let json = serde_json::to_vec(record)?;
        Ok(hex::encode(Sha256::digest(&json)))
    }

    /// Whether the stored checksum matches the record.
    pub fn verify(&self) -> bool {
        Self::checksum_of(&self.record)
            .map(|sum| sum == self.checksum)
            .unwrap_or(false)
    }
}

/// Directory of checkpoint files, one per in-flight transition.
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Open (creating as needed) a checkpoint store.
    pub async fn open(root: impl AsRef<Path>) -> EngineResult<Self> {
        let dir = root.as_ref().join("checkpoints");
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path_for(&self, id: &BackupId) -> PathBuf {
        self.dir.join(format!("{}.checkpoint.json", id))
    }

    /// Snapshot `record` before its transition.
    pub async fn save(&self, record: &BackupRecord) -> EngineResult<Checkpoint> {
        let checkpoint = Checkpoint::new(record.clone(), Utc::now())?;
        let path = self.path_for(&record.id);
        let tmp = path.with_extension("tmp");

        let json = serde_json::to_vec_pretty(&checkpoint)?;
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &path).await?;

        debug!(backup_id = %record.id, "Wrote pre-transition checkpoint");
        Ok(checkpoint)
    }

    /// Load the checkpoint for `id`, verifying its checksum.
    pub async fn load(&self, id: &BackupId) -> EngineResult<Checkpoint> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(EngineError::NotFound(id.clone()));
        }

        let bytes = tokio::fs::read(&path).await?;
        let checkpoint: Checkpoint = serde_json::from_slice(&bytes)?;
        if !checkpoint.verify() {
            return Err(EngineError::CorruptionDetected(id.clone()));
        }
        Ok(checkpoint)
    }

    /// Discard the checkpoint for `id` after a committed transition.
    pub async fn remove(&self, id: &BackupId) -> EngineResult<()> {
        let path = self.path_for(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Backup ids with leftover checkpoints (interrupted transitions).
    pub async fn leftover_ids(&self) -> EngineResult<Vec<BackupId>> {
        let mut ids = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(id) = name.strip_suffix(".checkpoint.json") {
                ids.push(BackupId::new(id));
            }
        }

        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodian_types::BackupKind;

    fn record(id: &str) -> BackupRecord {
        BackupRecord::new(BackupId::new(id), 512, BackupKind::Data, Utc::now())
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).await.unwrap();

        let r = record("b1");
        store.save(&r).await.unwrap();

        let loaded = store.load(&BackupId::new("b1")).await.unwrap();
        assert_eq!(loaded.record, r);
        assert!(loaded.verify());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).await.unwrap();

        store.save(&record("b1")).await.unwrap();
        store.remove(&BackupId::new("b1")).await.unwrap();
        store.remove(&BackupId::new("b1")).await.unwrap();

        assert!(store.load(&BackupId::new("b1")).await.is_err());
    }

    #[tokio::test]
    async fn test_leftovers_listed_after_crash() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).await.unwrap();

        store.save(&record("b1")).await.unwrap();
        store.save(&record("b2")).await.unwrap();

        let ids = store.leftover_ids().await.unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0].as_str(), "b1");
        assert_eq!(ids[1].as_str(), "b2");
    }

    #[tokio::test]
    async fn test_tampered_checkpoint_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).await.unwrap();
        store.save(&record("b1")).await.unwrap();

        let path = dir.path().join("checkpoints/b1.checkpoint.json");
        let mut doc: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        doc["record"]["size_bytes"] = serde_json::json!(424242);
        std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

        let err = store.load(&BackupId::new("b1")).await.unwrap_err();
        assert!(matches!(err, EngineError::CorruptionDetected(_)));
    }
}
