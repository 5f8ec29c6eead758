//! The archiver/deleter seam.
//!
//! Payload mechanics (compression, storage layout) belong to an
//! external collaborator; the engine only drives it through this trait
//! and verifies archive integrity before committing.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use custodian_types::{BackupRecord, EngineError, EngineResult};
use tracing::debug;

/// Receipt for an archived payload.
#[derive(Debug, Clone)]
pub struct ArchiveReceipt {
    /// Where the archived copy lives.
    pub archive_path: PathBuf,

    /// Hex SHA-256 of the archived copy.
    pub integrity: String,
}

/// External side-effect executor for destructive transitions.
#[async_trait]
pub trait SideEffector: Send + Sync {
    /// Copy the payload into archival storage and return a receipt.
    async fn archive(&self, record: &BackupRecord) -> EngineResult<ArchiveReceipt>;

    /// Re-hash the archived copy and confirm it matches the receipt.
    async fn verify_archive(&self, receipt: &ArchiveReceipt) -> EngineResult<bool>;

    /// Purge the payload (the metadata tombstone stays in the registry).
    async fn delete(&self, record: &BackupRecord) -> EngineResult<()>;
}

/// Filesystem archiver: copies payloads into an archive directory and
/// hashes both sides.
pub struct FsSideEffector {
    archive_dir: PathBuf,
}

impl FsSideEffector {
    /// Open (creating as needed) an archiver rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> EngineResult<Self> {
        let archive_dir = root.as_ref().join("archive");
        tokio::fs::create_dir_all(&archive_dir).await?;
        Ok(Self { archive_dir })
    }

    async fn hash_file(path: &Path) -> EngineResult<String> {
        use sha2::{Digest, Sha256};
        let bytes = tokio::fs::read(path).await?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

#[async_trait]
impl SideEffector for FsSideEffector {
    async fn archive(&self, record: &BackupRecord) -> EngineResult<ArchiveReceipt> {
        let payload = record.payload_path.as_ref().ok_or_else(|| {
            EngineError::SideEffectFailure {
                backup_id: record.id.clone(),
                message: "record has no payload path to archive".into(),
            }
        })?;

        let target = self.archive_dir.join(format!("{}.archive", record.id));
        tokio::fs::copy(payload, &target).await?;

        let integrity = Self::hash_file(&target).await?;
        debug!(backup_id = %record.id, archive = %target.display(), "Archived payload");

        Ok(ArchiveReceipt {
            archive_path: target,
            integrity,
        })
    }

    async fn verify_archive(&self, receipt: &ArchiveReceipt) -> EngineResult<bool> {
        let actual = Self::hash_file(&receipt.archive_path).await?;
        Ok(actual == receipt.integrity)
    }

    async fn delete(&self, record: &BackupRecord) -> EngineResult<()> {
        // Purge whichever copy still exists: the live payload, and the
        // archive when deleting an archived record.
        if let Some(payload) = &record.payload_path {
            match tokio::fs::remove_file(payload).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if let Some(archive) = &record.archive_path {
            match tokio::fs::remove_file(archive).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        debug!(backup_id = %record.id, "Purged payload");
        Ok(())
    }
}

/// Scripted side effector for tests: succeeds or fails on demand and
/// counts invocations so tests can assert a side effect never ran twice
/// for one logical transition.
#[derive(Default)]
pub struct ScriptedSideEffector {
    /// Number of archive calls.
    pub archive_calls: AtomicU32,

    /// Number of delete calls.
    pub delete_calls: AtomicU32,

    /// Fail the first N side-effect calls.
    pub fail_first: AtomicU32,

    /// Delay applied inside each call, ms.
    pub delay_ms: u64,
}

impl ScriptedSideEffector {
    /// An effector that always succeeds.
    pub fn succeeding() -> Self {
        Self::default()
    }

    /// An effector that fails its first `n` calls.
    pub fn failing_first(n: u32) -> Self {
        let effector = Self::default();
        effector.fail_first.store(n, Ordering::SeqCst);
        effector
    }

    /// An effector that holds each call for `delay_ms`.
    pub fn slow(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            ..Self::default()
        }
    }

    fn should_fail(&self) -> bool {
        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    async fn pause(&self) {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
    }
}

#[async_trait]
impl SideEffector for ScriptedSideEffector {
    async fn archive(&self, record: &BackupRecord) -> EngineResult<ArchiveReceipt> {
        self.pause().await;
        self.archive_calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail() {
            return Err(EngineError::SideEffectFailure {
                backup_id: record.id.clone(),
                message: "scripted archive failure".into(),
            });
        }
        Ok(ArchiveReceipt {
            archive_path: PathBuf::from(format!("/archive/{}.archive", record.id)),
            integrity: "scripted".into(),
        })
    }

    async fn verify_archive(&self, _receipt: &ArchiveReceipt) -> EngineResult<bool> {
        Ok(true)
    }

    async fn delete(&self, record: &BackupRecord) -> EngineResult<()> {
        self.pause().await;
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail() {
            return Err(EngineError::SideEffectFailure {
                backup_id: record.id.clone(),
                message: "scripted delete failure".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use custodian_types::{BackupId, BackupKind};

    fn record_with_payload(dir: &Path, id: &str, contents: &[u8]) -> BackupRecord {
        let payload = dir.join(format!("{id}.payload"));
        std::fs::write(&payload, contents).unwrap();

        let mut r = BackupRecord::new(
            BackupId::new(id),
            contents.len() as u64,
            BackupKind::Data,
            Utc::now(),
        );
        r.payload_path = Some(payload);
        r.finalize()
    }

    #[tokio::test]
    async fn test_archive_copies_and_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let effector = FsSideEffector::open(dir.path()).await.unwrap();
        let r = record_with_payload(dir.path(), "b1", b"payload bytes");

        let receipt = effector.archive(&r).await.unwrap();
        assert!(receipt.archive_path.exists());
        assert!(effector.verify_archive(&receipt).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_detects_tampered_archive() {
        let dir = tempfile::tempdir().unwrap();
        let effector = FsSideEffector::open(dir.path()).await.unwrap();
        let r = record_with_payload(dir.path(), "b1", b"payload bytes");

        let receipt = effector.archive(&r).await.unwrap();
        std::fs::write(&receipt.archive_path, b"tampered").unwrap();
        assert!(!effector.verify_archive(&receipt).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_purges_payload_and_archive() {
        let dir = tempfile::tempdir().unwrap();
        let effector = FsSideEffector::open(dir.path()).await.unwrap();
        let mut r = record_with_payload(dir.path(), "b1", b"bytes");

        let receipt = effector.archive(&r).await.unwrap();
        r.archive_path = Some(receipt.archive_path.clone());
        let r = r.finalize();

        effector.delete(&r).await.unwrap();
        assert!(!r.payload_path.as_ref().unwrap().exists());
        assert!(!receipt.archive_path.exists());

        // Deleting again is a no-op, not an error.
        effector.delete(&r).await.unwrap();
    }

    #[tokio::test]
    async fn test_scripted_failure_budget() {
        let effector = ScriptedSideEffector::failing_first(2);
        let dir = tempfile::tempdir().unwrap();
        let r = record_with_payload(dir.path(), "b1", b"x");

        assert!(effector.delete(&r).await.is_err());
        assert!(effector.delete(&r).await.is_err());
        assert!(effector.delete(&r).await.is_ok());
        assert_eq!(effector.delete_calls.load(Ordering::SeqCst), 3);
    }
}
