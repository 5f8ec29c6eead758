//! Git hook trigger.
//!
//! Invoked synchronously inside commit/merge/push. The hook must never
//! block or fail the underlying version-control operation: it spools
//! the event within a bounded budget and swallows (but logs) every
//! failure. The daemon's spool consumer turns events into requests.

use std::time::Duration;

use custodian_types::{
    BackupRecord, BackupState, HookKind, TransitionRequest, TriggerSource,
};
use tracing::{debug, warn};

use crate::spool::{EventSpool, HookEvent};

/// Default budget for the synchronous hook path.
pub const DEFAULT_HOOK_BUDGET: Duration = Duration::from_millis(500);

/// Bounded-latency hook entry point.
pub struct GitHookTrigger {
    spool: EventSpool,
    budget: Duration,
}

impl GitHookTrigger {
    /// Wrap a spool with the default budget.
    pub fn new(spool: EventSpool) -> Self {
        Self {
            spool,
            budget: DEFAULT_HOOK_BUDGET,
        }
    }

    /// Override the latency budget.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Record a hook invocation. Always returns: a spool failure or a
    /// blown budget is logged, never propagated, so the version-control
    /// operation cannot be failed by the backup engine.
    pub async fn record_event(&self, hook: HookKind, revision: Option<String>) {
        let event = HookEvent::new(hook, revision);

        match tokio::time::timeout(self.budget, self.spool.append(&event)).await {
            Ok(Ok(())) => {
                debug!(hook = %hook, event_id = %event.id, "Spooled hook event");
            }
            Ok(Err(e)) => {
                warn!(hook = %hook, error = %e, "Failed to spool hook event");
            }
            Err(_) => {
                warn!(hook = %hook, budget_ms = self.budget.as_millis() as u64,
                      "Hook budget exceeded; event dropped");
            }
        }
    }
}

/// Translate a drained hook event into transition requests against the
/// given records.
///
/// A commit moves every created record to pending; a merge moves every
/// pending record to confirmed. A pre-push event carries no lifecycle
/// edge and produces nothing. Records that already transitioned are
/// simply not matched; resubmission races are handled by the
/// coordinator as safe no-ops.
pub fn requests_for_event(event: &HookEvent, records: &[BackupRecord]) -> Vec<TransitionRequest> {
    let trigger = TriggerSource::GitHook { event: event.hook };

    let target = match event.hook {
        HookKind::PostCommit => BackupState::Pending,
        HookKind::PostMerge => BackupState::Confirmed,
        HookKind::PrePush => return Vec::new(),
    };
    let from = match event.hook {
        HookKind::PostCommit => BackupState::Created,
        HookKind::PostMerge => BackupState::Pending,
        HookKind::PrePush => unreachable!(),
    };

    records
        .iter()
        .filter(|r| r.state == from)
        .map(|r| TransitionRequest::new(r.id.clone(), target, trigger))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use custodian_types::{BackupId, BackupKind};

    fn record_in(id: &str, state: BackupState) -> BackupRecord {
        let mut r = BackupRecord::new(BackupId::new(id), 128, BackupKind::SourceCode, Utc::now());
        r.state = state;
        r.finalize()
    }

    #[tokio::test]
    async fn test_record_event_spools_within_budget() {
        let dir = tempfile::tempdir().unwrap();
        let spool = EventSpool::open(dir.path()).await.unwrap();
        let trigger = GitHookTrigger::new(spool);

        trigger
            .record_event(HookKind::PostCommit, Some("abc123".into()))
            .await;

        let spool = EventSpool::open(dir.path()).await.unwrap();
        let events = spool.drain().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].hook, HookKind::PostCommit);
        assert_eq!(events[0].revision.as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn test_record_event_never_fails_the_vcs_operation() {
        // Point the spool at a directory that is then removed; the
        // append fails but record_event still returns normally.
        let dir = tempfile::tempdir().unwrap();
        let spool = EventSpool::open(dir.path()).await.unwrap();
        std::fs::remove_dir_all(dir.path().join("spool")).unwrap();

        let trigger = GitHookTrigger::new(spool);
        trigger.record_event(HookKind::PostMerge, None).await;
    }

    #[test]
    fn test_commit_event_targets_created_records() {
        let records = vec![
            record_in("created-1", BackupState::Created),
            record_in("created-2", BackupState::Created),
            record_in("pending", BackupState::Pending),
            record_in("deleted", BackupState::Deleted),
        ];
        let event = HookEvent::new(HookKind::PostCommit, None);

        let requests = requests_for_event(&event, &records);
        assert_eq!(requests.len(), 2);
        for request in &requests {
            assert_eq!(request.target, BackupState::Pending);
            assert!(request.backup_id.as_str().starts_with("created-"));
        }
    }

    #[test]
    fn test_merge_event_targets_pending_records() {
        let records = vec![
            record_in("created", BackupState::Created),
            record_in("pending", BackupState::Pending),
        ];
        let event = HookEvent::new(HookKind::PostMerge, None);

        let requests = requests_for_event(&event, &records);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].backup_id.as_str(), "pending");
        assert_eq!(requests[0].target, BackupState::Confirmed);
    }

    #[test]
    fn test_push_event_produces_no_transitions() {
        let records = vec![record_in("pending", BackupState::Pending)];
        let event = HookEvent::new(HookKind::PrePush, None);
        assert!(requests_for_event(&event, &records).is_empty());
    }
}
