//! Cross-process per-backup locks.
//!
//! Mutual exclusion is backed by atomic lock-file creation
//! (`create_new`): the winner writes a JSON `LockToken` carrying its
//! holder identity and a liveness deadline. Waiters poll until the
//! configured timeout and then fail with `Busy`. A token whose deadline
//! has elapsed marks a crashed holder: the lock is force-released with
//! a warning and acquisition continues.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use custodian_types::{BackupId, EngineError, EngineResult, HolderId, LockPolicy};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// On-disk lock token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockToken {
    /// Backup the lock protects.
    pub backup_id: BackupId,

    /// Identity of the holding process.
    pub holder: HolderId,

    /// When the lock was taken.
    pub acquired_at: DateTime<Utc>,

    /// Instant after which the holder is presumed dead.
    pub liveness_deadline: DateTime<Utc>,
}

impl LockToken {
    fn new(backup_id: BackupId, holder: HolderId, ttl_secs: u64) -> Self {
        let now = Utc::now();
        Self {
            backup_id,
            holder,
            acquired_at: now,
            liveness_deadline: now + ChronoDuration::seconds(ttl_secs as i64),
        }
    }

    /// Whether the holder's liveness window has elapsed.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now > self.liveness_deadline
    }
}

/// Guard over an acquired lock. Release explicitly with
/// [`LockGuard::release`]; dropping without release removes the lock
/// file on a best-effort basis.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    token: LockToken,
    released: bool,
}

impl LockGuard {
    /// The token written for this acquisition.
    pub fn token(&self) -> &LockToken {
        &self.token
    }

    /// Release the lock, removing the lock file.
    pub async fn release(mut self) -> EngineResult<()> {
        self.released = true;
        tokio::fs::remove_file(&self.path).await?;
        debug!(backup_id = %self.token.backup_id, "Released lock");
        Ok(())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Cross-process lock manager rooted at a locks directory.
pub struct LockManager {
    locks_dir: PathBuf,
    holder: HolderId,
    policy: LockPolicy,
}

impl LockManager {
    /// Open (creating the directory as needed) a lock manager.
    pub async fn open(root: impl AsRef<Path>, policy: LockPolicy) -> EngineResult<Self> {
        let locks_dir = root.as_ref().join("locks");
        tokio::fs::create_dir_all(&locks_dir).await?;

        Ok(Self {
            locks_dir,
            holder: HolderId::current(),
            policy,
        })
    }

    /// This manager's holder identity.
    pub fn holder(&self) -> &HolderId {
        &self.holder
    }

    fn lock_path(&self, id: &BackupId) -> PathBuf {
        self.locks_dir.join(format!("{}.lock", id))
    }

    /// Acquire the lock for `id`, waiting up to the policy timeout.
    /// Returns `Busy` on timeout without mutating anything.
    pub async fn acquire(&self, id: &BackupId) -> EngineResult<LockGuard> {
        let deadline =
            tokio::time::Instant::now() + std::time::Duration::from_millis(self.policy.acquire_timeout_ms);
        let path = self.lock_path(id);

        loop {
            match self.try_create(&path, id).await {
                Ok(token) => {
                    debug!(backup_id = %id, holder = %token.holder, "Acquired lock");
                    return Ok(LockGuard {
                        path,
                        token,
                        released: false,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if self.reap_if_stale(&path, id).await? {
                        continue;
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return Err(EngineError::Busy(id.clone()));
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(
                        self.policy.retry_interval_ms,
                    ))
                    .await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Extend the liveness deadline of a held lock before a long side
    /// effect, so a slow archive is not mistaken for a crash.
    pub async fn refresh(&self, guard: &mut LockGuard) -> EngineResult<()> {
        guard.token.liveness_deadline =
            Utc::now() + ChronoDuration::seconds(self.policy.liveness_ttl_secs as i64);
        let json = serde_json::to_vec_pretty(&guard.token)?;
        tokio::fs::write(&guard.path, json).await?;
        Ok(())
    }

    async fn try_create(&self, path: &Path, id: &BackupId) -> std::io::Result<LockToken> {
        let token = LockToken::new(id.clone(), self.holder.clone(), self.policy.liveness_ttl_secs);
        let json = serde_json::to_vec_pretty(&token).map_err(std::io::Error::other)?;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        Ok(token)
    }

    /// Force-release a lock whose holder's liveness deadline elapsed.
    /// Returns true if a stale lock was removed.
    async fn reap_if_stale(&self, path: &Path, id: &BackupId) -> EngineResult<bool> {
        let token: Option<LockToken> = match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).ok(),
            // Lost a race with a releasing holder.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        };

        // An unreadable token is treated as stale: the writer crashed
        // mid-write or the file is damaged either way.
        let stale = token.as_ref().map(|t| t.is_stale(Utc::now())).unwrap_or(true);
        if !stale {
            return Ok(false);
        }

        let holder = token
            .map(|t| t.holder.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        warn!(
            backup_id = %id,
            holder = %holder,
            "Force-releasing stale lock"
        );

        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy() -> LockPolicy {
        LockPolicy {
            acquire_timeout_ms: 100,
            retry_interval_ms: 10,
            liveness_ttl_secs: 60,
        }
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let manager = LockManager::open(dir.path(), fast_policy()).await.unwrap();
        let id = BackupId::new("b1");

        let guard = manager.acquire(&id).await.unwrap();
        assert!(dir.path().join("locks/b1.lock").exists());

        guard.release().await.unwrap();
        assert!(!dir.path().join("locks/b1.lock").exists());

        // Reacquirable after release.
        let guard = manager.acquire(&id).await.unwrap();
        guard.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_contention_times_out_with_busy() {
        let dir = tempfile::tempdir().unwrap();
        let manager = LockManager::open(dir.path(), fast_policy()).await.unwrap();
        let other = LockManager::open(dir.path(), fast_policy()).await.unwrap();
        let id = BackupId::new("b1");

        let guard = manager.acquire(&id).await.unwrap();
        let err = other.acquire(&id).await.unwrap_err();
        assert!(matches!(err, EngineError::Busy(_)));

        guard.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_lock_is_force_released() {
        let dir = tempfile::tempdir().unwrap();
        let manager = LockManager::open(dir.path(), fast_policy()).await.unwrap();
        let id = BackupId::new("b1");

        // Simulate a crashed holder: expired token on disk.
        let dead = LockToken {
            backup_id: id.clone(),
            holder: HolderId::current(),
            acquired_at: Utc::now() - ChronoDuration::hours(2),
            liveness_deadline: Utc::now() - ChronoDuration::hours(1),
        };
        let path = dir.path().join("locks/b1.lock");
        std::fs::write(&path, serde_json::to_vec(&dead).unwrap()).unwrap();

        let guard = manager.acquire(&id).await.unwrap();
        assert_eq!(guard.token().holder, *manager.holder());
        guard.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_garbage_lock_file_is_reaped() {
        let dir = tempfile::tempdir().unwrap();
        let manager = LockManager::open(dir.path(), fast_policy()).await.unwrap();
        let id = BackupId::new("b1");

        let path = dir.path().join("locks/b1.lock");
        std::fs::write(&path, b"not a token").unwrap();

        let guard = manager.acquire(&id).await.unwrap();
        guard.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_guard_drop_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let manager = LockManager::open(dir.path(), fast_policy()).await.unwrap();
        let id = BackupId::new("b1");

        {
            let _guard = manager.acquire(&id).await.unwrap();
        }
        assert!(!dir.path().join("locks/b1.lock").exists());
    }
}
