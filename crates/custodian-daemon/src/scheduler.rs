//! Trigger loops and queue drain.
//!
//! The scheduler owns the daemon-side trigger adapters and the
//! priority queue between them and the coordinator. Two fixed-tick
//! loops drive it: a poll tick (spool consumption + time-policy scan)
//! and a disk tick (pressure sampling + relief sweeps). Shutdown is
//! graceful: the in-flight queue is drained before the loop exits.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use custodian_engine::{Coordinator, RequestQueue};
use custodian_registry::Registry;
use custodian_triggers::{
    plan_sweep, requests_for_event, DiskMonitor, DiskSampler, EventSpool, TimeTrigger,
};
use custodian_types::{BackupState, DiskLevel, EngineResult, Outcome, RejectCause};
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::SchedulerConfig;

/// Daemon scheduler: consumes triggers, drains the queue.
pub struct Scheduler {
    coordinator: Arc<Coordinator>,
    registry: Arc<dyn Registry>,
    spool: EventSpool,
    time_trigger: TimeTrigger,
    sampler: Box<dyn DiskSampler>,
    monitor: DiskMonitor,
    queue: RequestQueue,
    active_sweeps: HashMap<Uuid, DiskLevel>,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Assemble the scheduler.
    pub fn new(
        coordinator: Arc<Coordinator>,
        registry: Arc<dyn Registry>,
        spool: EventSpool,
        sampler: Box<dyn DiskSampler>,
        config: SchedulerConfig,
    ) -> Self {
        let policy = coordinator.policy().clone();
        let time_trigger = TimeTrigger::new(registry.clone(), policy.state_timeouts.clone());
        let monitor = DiskMonitor::new(policy.disk.clone());

        Self {
            coordinator,
            registry,
            spool,
            time_trigger,
            sampler,
            monitor,
            queue: RequestQueue::new(),
            active_sweeps: HashMap::new(),
            config,
        }
    }

    /// Run until the shutdown signal fires. Any transition already
    /// queued is completed before the loop exits; no new work is
    /// accepted after the signal.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> EngineResult<()> {
        let mut poll = interval(Duration::from_secs(self.config.poll_interval_secs));
        let mut disk = interval(Duration::from_secs(self.config.disk_interval_secs));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        disk.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            poll_secs = self.config.poll_interval_secs,
            disk_secs = self.config.disk_interval_secs,
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if let Err(e) = self.poll_tick().await {
                        error!(error = %e, "Poll tick failed");
                    }
                }
                _ = disk.tick() => {
                    if let Err(e) = self.disk_tick().await {
                        error!(error = %e, "Disk tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("Shutdown requested; draining in-flight work");
                    self.drain_queue().await;
                    break;
                }
            }
        }

        info!("Scheduler stopped");
        Ok(())
    }

    /// One poll tick: consume spooled hook events, scan for time-policy
    /// transitions, drain the queue.
    pub async fn poll_tick(&mut self) -> EngineResult<()> {
        self.consume_spool().await?;

        for request in self.time_trigger.cycle(Utc::now()).await? {
            self.queue.push(request);
        }

        self.drain_queue().await;
        Ok(())
    }

    /// One disk tick: sample, classify, and on an escalation plan a
    /// relief sweep; then drain the queue.
    pub async fn disk_tick(&mut self) -> EngineResult<()> {
        let sample = self.sampler.sample()?;
        let (level, escalated) = self.monitor.observe(sample.used_pct());

        if escalated {
            let policy = self.coordinator.policy();
            let cleanable = self.registry.list_in_state(BackupState::Cleanable).await?;

            if let Some(plan) = plan_sweep(
                &cleanable,
                &sample,
                level,
                &policy.disk,
                &policy.scoring,
                &policy.thresholds,
                Utc::now(),
            ) {
                self.active_sweeps.insert(plan.batch_id, plan.level);
                for request in plan.requests {
                    self.queue.push_in_batch(request, Some(plan.batch_id));
                }
            }
        }

        self.drain_queue().await;
        Ok(())
    }

    /// Dispatch queued requests through the coordinator in priority
    /// order. Before each sweep-batch request, usage is re-sampled: if
    /// the batch's relief target is already met, the remainder of that
    /// batch is cancelled.
    pub async fn drain_queue(&mut self) {
        while let Some(entry) = self.queue.pop() {
            if let Some(batch) = entry.batch {
                if self.sweep_relieved(batch) {
                    debug!(batch = %batch, "Relief target met; cancelling batch remainder");
                    self.queue.cancel_batch(batch);
                    self.active_sweeps.remove(&batch);
                    continue;
                }
            }

            let backup_id = entry.request.backup_id.clone();
            match self.coordinator.submit(entry.request).await {
                Ok(result) => match result.outcome {
                    Outcome::Committed => {
                        debug!(backup_id = %backup_id, state = %result.new_state, "Dispatched transition");
                    }
                    Outcome::Rejected => match result.cause {
                        // Expected when a record transitioned between
                        // scan and dispatch; a safe no-op.
                        Some(RejectCause::InvalidTransition { .. }) => {
                            debug!(backup_id = %backup_id, "Request superseded; skipped");
                        }
                        cause => {
                            debug!(backup_id = %backup_id, cause = ?cause, "Request rejected");
                        }
                    },
                },
                Err(e) => {
                    error!(backup_id = %backup_id, error = %e, "Failed to dispatch request");
                }
            }
        }
    }

    fn sweep_relieved(&self, batch: Uuid) -> bool {
        let Some(level) = self.active_sweeps.get(&batch).copied() else {
            return false;
        };
        let Ok(sample) = self.sampler.sample() else {
            return false;
        };

        let target = self.coordinator.policy().disk.relief_target(level);
        sample.used_pct() < target
    }

    async fn consume_spool(&mut self) -> EngineResult<()> {
        let events = self.spool.drain().await?;
        if events.is_empty() {
            return Ok(());
        }

        let records = self.registry.list(&|_| true).await?;
        for event in &events {
            for request in requests_for_event(event, &records) {
                self.queue.push(request);
            }
        }

        debug!(events = events.len(), "Consumed spooled hook events");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use custodian_engine::{MemoryAuditSink, ScriptedSideEffector};
    use custodian_registry::InMemoryRegistry;
    use custodian_triggers::{DiskSample, HookEvent, StaticSampler};
    use custodian_types::{
        BackupId, BackupKind, BackupRecord, EnginePolicy, HookKind,
    };

    const GIB: u64 = 1024 * 1024 * 1024;

    async fn scheduler_at(
        used_gib: u64,
    ) -> (tempfile::TempDir, Scheduler, Arc<InMemoryRegistry>) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(InMemoryRegistry::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let mut policy = EnginePolicy::default();
        policy.locks.acquire_timeout_ms = 100;
        policy.locks.retry_interval_ms = 10;

        let coordinator = Arc::new(
            Coordinator::new(
                dir.path(),
                registry.clone() as Arc<dyn Registry>,
                Arc::new(ScriptedSideEffector::succeeding()),
                audit,
                policy,
            )
            .await
            .unwrap(),
        );

        let spool = EventSpool::open(dir.path()).await.unwrap();
        let sampler = Box::new(StaticSampler(DiskSample {
            total_bytes: 100 * GIB,
            available_bytes: (100 - used_gib) * GIB,
        }));

        let scheduler = Scheduler::new(
            coordinator,
            registry.clone() as Arc<dyn Registry>,
            spool,
            sampler,
            SchedulerConfig::default(),
        );
        (dir, scheduler, registry)
    }

    fn cleanable(id: &str, age_days: i64, size: u64) -> BackupRecord {
        let now = Utc::now();
        let mut r = BackupRecord::new(
            BackupId::new(id),
            size,
            BackupKind::SourceCode,
            now - ChronoDuration::days(age_days),
        );
        r.state = BackupState::Cleanable;
        r.merge_confirmed = true;
        r.last_accessed_at = now - ChronoDuration::days(age_days);
        r.finalize()
    }

    #[tokio::test]
    async fn test_spooled_commit_event_moves_record_to_pending() {
        let (dir, mut scheduler, registry) = scheduler_at(50).await;

        registry
            .put(&BackupRecord::new(
                BackupId::new("b1"),
                128,
                BackupKind::SourceCode,
                Utc::now(),
            ))
            .await
            .unwrap();

        let spool = EventSpool::open(dir.path()).await.unwrap();
        spool
            .append(&HookEvent::new(HookKind::PostCommit, Some("abc".into())))
            .await
            .unwrap();

        scheduler.poll_tick().await.unwrap();

        let record = registry.get(&BackupId::new("b1")).await.unwrap();
        assert_eq!(record.state, BackupState::Pending);
    }

    #[tokio::test]
    async fn test_time_policy_transition_via_tick() {
        let (_dir, mut scheduler, registry) = scheduler_at(50).await;

        // Pending far beyond the abandonment window.
        let now = Utc::now();
        let mut r = BackupRecord::new(
            BackupId::new("b1"),
            128,
            BackupKind::SourceCode,
            now - ChronoDuration::days(60),
        );
        r.state = BackupState::Pending;
        registry.put(&r.finalize()).await.unwrap();

        scheduler.poll_tick().await.unwrap();

        let record = registry.get(&BackupId::new("b1")).await.unwrap();
        assert_eq!(record.state, BackupState::Cleanable);
    }

    #[tokio::test]
    async fn test_disk_escalation_sweeps_cleanable_records() {
        let (_dir, mut scheduler, registry) = scheduler_at(96).await;

        registry.put(&cleanable("old", 400, 2 * GIB)).await.unwrap();
        registry.put(&cleanable("older", 300, 2 * GIB)).await.unwrap();
        registry.put(&cleanable("young", 10, 2 * GIB)).await.unwrap();

        scheduler.disk_tick().await.unwrap();

        // The static sampler keeps reporting 96%, so the whole planned
        // batch is dispatched; the plan itself was sized to relief.
        let deleted = registry.list_in_state(BackupState::Deleted).await.unwrap();
        assert_eq!(deleted.len(), 2);
        let ids: Vec<_> = deleted.iter().map(|r| r.id.as_str().to_string()).collect();
        assert!(ids.contains(&"old".to_string()));
        assert!(ids.contains(&"older".to_string()));
    }

    #[tokio::test]
    async fn test_second_tick_without_escalation_does_not_resweep() {
        let (_dir, mut scheduler, registry) = scheduler_at(96).await;
        registry.put(&cleanable("a", 400, 2 * GIB)).await.unwrap();

        scheduler.disk_tick().await.unwrap();
        let after_first = registry.list_in_state(BackupState::Deleted).await.unwrap().len();

        // Same level on the next tick: no new escalation, no new sweep.
        scheduler.disk_tick().await.unwrap();
        let after_second = registry.list_in_state(BackupState::Deleted).await.unwrap().len();
        assert_eq!(after_first, after_second);
    }
}
