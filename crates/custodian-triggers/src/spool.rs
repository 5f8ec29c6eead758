//! File spool for hook events.
//!
//! Hooks run inside version-control operations with a tight latency
//! budget, so they hand events to the daemon through a spool directory:
//! one JSON file per event, written atomically, consumed by the
//! daemon's next tick. Writing a small file is the entire synchronous
//! cost paid inside the hook.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use custodian_types::{EngineResult, HookKind};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

/// One hook invocation, as spooled for the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookEvent {
    /// Event ID.
    pub id: Uuid,

    /// Which hook fired.
    pub hook: HookKind,

    /// Version-control revision involved, if the hook knows it.
    pub revision: Option<String>,

    /// When the hook fired.
    pub occurred_at: DateTime<Utc>,
}

impl HookEvent {
    /// Build an event stamped now.
    pub fn new(hook: HookKind, revision: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            hook,
            revision,
            occurred_at: Utc::now(),
        }
    }
}

/// Spool directory of pending hook events.
pub struct EventSpool {
    dir: PathBuf,
}

impl EventSpool {
    /// Open (creating as needed) a spool under `root`.
    pub async fn open(root: impl AsRef<Path>) -> EngineResult<Self> {
        let dir = root.as_ref().join("spool");
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// Append one event atomically (write-new, then publish).
    pub async fn append(&self, event: &HookEvent) -> EngineResult<()> {
        let path = self.dir.join(format!("{}.json", event.id));
        let tmp = path.with_extension("tmp");

        let json = serde_json::to_vec(event)?;
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Take every pending event, oldest first, removing the files.
    /// An unreadable event file is dropped with a warning; it never
    /// stalls the consumer.
    pub async fn drain(&self) -> EngineResult<Vec<HookEvent>> {
        let mut events = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }

            match tokio::fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<HookEvent>(&bytes) {
                    Ok(event) => events.push(event),
                    Err(e) => {
                        warn!(file = %path.display(), error = %e, "Dropping unreadable hook event");
                    }
                },
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Dropping unreadable hook event");
                }
            }

            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(file = %path.display(), error = %e, "Failed to remove drained event");
            }
        }

        events.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at));
        Ok(events)
    }

    /// Number of pending events.
    pub async fn pending(&self) -> EngineResult<usize> {
        let mut count = 0;
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            if entry.path().extension().map(|e| e == "json").unwrap_or(false) {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_and_drain_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let spool = EventSpool::open(dir.path()).await.unwrap();

        let first = HookEvent::new(HookKind::PostCommit, Some("abc123".into()));
        let second = HookEvent::new(HookKind::PostMerge, None);
        spool.append(&first).await.unwrap();
        spool.append(&second).await.unwrap();
        assert_eq!(spool.pending().await.unwrap(), 2);

        let events = spool.drain().await.unwrap();
        assert_eq!(events, vec![first, second]);

        // Drained events are gone.
        assert_eq!(spool.pending().await.unwrap(), 0);
        assert!(spool.drain().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_event_is_dropped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let spool = EventSpool::open(dir.path()).await.unwrap();

        spool
            .append(&HookEvent::new(HookKind::PostCommit, None))
            .await
            .unwrap();
        std::fs::write(dir.path().join("spool/garbage.json"), b"{ nope").unwrap();

        let events = spool.drain().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(spool.pending().await.unwrap(), 0);
    }
}
