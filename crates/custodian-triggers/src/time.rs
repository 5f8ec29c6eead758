//! Time/age policy trigger.
//!
//! A recurring scan over the registry: any record whose time-in-state
//! exceeds the configured per-state timeout gets one transition
//! request. Re-emitting for a record that already moved is safe; the
//! coordinator rejects it without mutation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use custodian_registry::Registry;
use custodian_types::{
    BackupRecord, BackupState, EngineResult, StateTimeouts, TransitionRequest, TriggerSource,
};
use tracing::debug;

/// Requests for records that outstayed their state, per policy.
///
/// Stuck records are skipped until an operator intervenes.
pub fn eligible_requests(
    records: &[BackupRecord],
    timeouts: &StateTimeouts,
    now: DateTime<Utc>,
) -> Vec<TransitionRequest> {
    let mut requests = Vec::new();

    for record in records {
        if record.stuck {
            continue;
        }

        let in_state = record.time_in_state(now).num_seconds().max(0) as u64;
        let target = match record.state {
            BackupState::Pending if in_state > timeouts.pending_abandon_secs => {
                Some(BackupState::Cleanable)
            }
            BackupState::Confirmed if in_state > timeouts.confirmed_retention_secs => {
                Some(BackupState::Cleanable)
            }
            BackupState::Archived if in_state > timeouts.archive_retention_secs => {
                Some(BackupState::Deleted)
            }
            _ => None,
        };

        if let Some(target) = target {
            requests.push(TransitionRequest::new(
                record.id.clone(),
                target,
                TriggerSource::Time,
            ));
        }
    }

    requests
}

/// Polling adapter over a registry handle.
pub struct TimeTrigger {
    registry: Arc<dyn Registry>,
    timeouts: StateTimeouts,
}

impl TimeTrigger {
    /// Build the adapter.
    pub fn new(registry: Arc<dyn Registry>, timeouts: StateTimeouts) -> Self {
        Self { registry, timeouts }
    }

    /// One polling cycle: scan and emit eligible requests.
    pub async fn cycle(&self, now: DateTime<Utc>) -> EngineResult<Vec<TransitionRequest>> {
        let records = self.registry.list(&|_| true).await?;
        let requests = eligible_requests(&records, &self.timeouts, now);

        if !requests.is_empty() {
            debug!(count = requests.len(), "Time trigger emitted requests");
        }
        Ok(requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use custodian_registry::InMemoryRegistry;
    use custodian_types::{BackupId, BackupKind};

    fn timeouts() -> StateTimeouts {
        StateTimeouts {
            pending_abandon_secs: 3600,
            confirmed_retention_secs: 7200,
            archive_retention_secs: 10_800,
        }
    }

    fn record_in_state_for(id: &str, state: BackupState, secs: i64) -> BackupRecord {
        let now = Utc::now();
        let created = now - Duration::seconds(secs);
        let mut r = BackupRecord::new(BackupId::new(id), 256, BackupKind::Data, created);
        r.state = state;
        r.finalize()
    }

    #[test]
    fn test_pending_abandonment() {
        let records = vec![
            record_in_state_for("fresh", BackupState::Pending, 60),
            record_in_state_for("abandoned", BackupState::Pending, 7200),
        ];

        let requests = eligible_requests(&records, &timeouts(), Utc::now());
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].backup_id.as_str(), "abandoned");
        assert_eq!(requests[0].target, BackupState::Cleanable);
    }

    #[test]
    fn test_confirmed_retention_and_archive_expiry() {
        let records = vec![
            record_in_state_for("retained", BackupState::Confirmed, 8000),
            record_in_state_for("expired", BackupState::Archived, 20_000),
            record_in_state_for("young", BackupState::Confirmed, 60),
        ];

        let requests = eligible_requests(&records, &timeouts(), Utc::now());
        assert_eq!(requests.len(), 2);

        let retained = requests
            .iter()
            .find(|r| r.backup_id.as_str() == "retained")
            .unwrap();
        assert_eq!(retained.target, BackupState::Cleanable);

        let expired = requests
            .iter()
            .find(|r| r.backup_id.as_str() == "expired")
            .unwrap();
        assert_eq!(expired.target, BackupState::Deleted);
    }

    #[test]
    fn test_terminal_and_cleanable_states_are_ignored() {
        let records = vec![
            record_in_state_for("cleanable", BackupState::Cleanable, 100_000),
            record_in_state_for("deleted", BackupState::Deleted, 100_000),
            record_in_state_for("created", BackupState::Created, 100_000),
        ];
        assert!(eligible_requests(&records, &timeouts(), Utc::now()).is_empty());
    }

    #[test]
    fn test_stuck_records_are_skipped() {
        let mut record = record_in_state_for("stuck", BackupState::Pending, 7200);
        record.stuck = true;
        let records = vec![record.finalize()];
        assert!(eligible_requests(&records, &timeouts(), Utc::now()).is_empty());
    }

    #[tokio::test]
    async fn test_cycle_reads_registry() {
        let registry = Arc::new(InMemoryRegistry::new());
        registry
            .put(&record_in_state_for("abandoned", BackupState::Pending, 7200))
            .await
            .unwrap();

        let trigger = TimeTrigger::new(registry, timeouts());
        let requests = trigger.cycle(Utc::now()).await.unwrap();
        assert_eq!(requests.len(), 1);
    }
}
