//! In-memory registry for tests and embedded use.

use async_trait::async_trait;
use custodian_types::{BackupId, BackupRecord, EngineError, EngineResult};
use dashmap::DashMap;

use crate::store::{RecordPredicate, Registry};

/// In-memory registry keyed by backup id.
#[derive(Default)]
pub struct InMemoryRegistry {
    records: DashMap<BackupId, BackupRecord>,
}

impl InMemoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn get(&self, id: &BackupId) -> EngineResult<BackupRecord> {
        let record = self
            .records
            .get(id)
            .map(|r| r.clone())
            .ok_or_else(|| EngineError::NotFound(id.clone()))?;

        if !record.verify_integrity() {
            self.records.remove(id);
            return Err(EngineError::CorruptionDetected(id.clone()));
        }

        Ok(record)
    }

    async fn list(&self, predicate: &RecordPredicate) -> EngineResult<Vec<BackupRecord>> {
        let mut records: Vec<BackupRecord> = self
            .records
            .iter()
            .map(|r| r.value().clone())
            .filter(|r| r.verify_integrity() && predicate(r))
            .collect();
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
        self.records.insert(record.id.clone(), record.clone());
        Ok(())
    }
}
