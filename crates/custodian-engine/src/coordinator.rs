//! The transition coordinator.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use custodian_registry::{LockManager, Registry};
use custodian_types::{
    BackupRecord, BackupState, DiskLevel, EngineError, EnginePolicy, EngineResult, RejectCause,
    TransitionRequest, TransitionResult, TriggerSource,
};
use tracing::{debug, info, instrument, warn};

use crate::audit::{AuditSink, PartialAuditEntry};
use crate::checkpoint::CheckpointStore;
use crate::effects::{ArchiveReceipt, SideEffector};

/// Serializes and applies lifecycle transitions.
///
/// One coordinator owns a workspace root. All mutation of backup
/// records flows through [`Coordinator::submit`]; trigger adapters and
/// the CLI are clients of this type, never of the registry directly.
pub struct Coordinator {
    registry: Arc<dyn Registry>,
    locks: LockManager,
    checkpoints: CheckpointStore,
    effects: Arc<dyn SideEffector>,
    audit: Arc<dyn AuditSink>,
    policy: EnginePolicy,
}

impl Coordinator {
    /// Assemble a coordinator over a workspace root. Locks and
    /// checkpoints live under `root`; registry, side effector, and
    /// audit sink are passed in as explicit handles.
    pub async fn new(
        root: impl AsRef<Path>,
        registry: Arc<dyn Registry>,
        effects: Arc<dyn SideEffector>,
        audit: Arc<dyn AuditSink>,
        policy: EnginePolicy,
    ) -> EngineResult<Self> {
        let locks = LockManager::open(&root, policy.locks.clone()).await?;
        let checkpoints = CheckpointStore::open(&root).await?;

        Ok(Self {
            registry,
            locks,
            checkpoints,
            effects,
            audit,
            policy,
        })
    }

    /// The active policy.
    pub fn policy(&self) -> &EnginePolicy {
        &self.policy
    }

    /// The registry handle.
    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    /// Restore records from checkpoints left behind by an interrupted
    /// transition (crash between checkpoint and commit). Returns the
    /// number of recovered records.
    pub async fn recover(&self) -> EngineResult<usize> {
        let ids = self.checkpoints.leftover_ids().await?;
        let mut recovered = 0;

        for id in &ids {
            match self.checkpoints.load(id).await {
                Ok(checkpoint) => {
                    warn!(backup_id = %id, "Recovering interrupted transition from checkpoint");
                    self.registry.put(&checkpoint.record).await?;
                    self.checkpoints.remove(id).await?;
                    recovered += 1;
                }
                Err(EngineError::CorruptionDetected(_)) => {
                    warn!(backup_id = %id, "Discarding corrupt checkpoint");
                    self.checkpoints.remove(id).await?;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(recovered)
    }

    /// Submit one transition request.
    ///
    /// Exactly one audit entry is written per call, committed or
    /// rejected. Recoverable rejections (busy, invalid edge, low
    /// confidence, side-effect failure, corruption) come back as a
    /// rejected [`TransitionResult`]; malformed requests and missing
    /// records are errors. For dry runs the result reports the verdict
    /// the engine would reach; nothing is persisted and the lock is
    /// released at validation's end.
    #[instrument(skip(self), fields(backup_id = %request.backup_id, target = %request.target))]
    pub async fn submit(&self, request: TransitionRequest) -> EngineResult<TransitionResult> {
        if let Err(e) = request.validate() {
            let from = self.peek_state(&request).await;
            let result = TransitionResult::rejected(
                RejectCause::Validation {
                    message: e.to_string(),
                },
                from,
                None,
            );
            self.write_audit(&request, from, &result).await?;
            return Err(e);
        }

        // Step 1: per-backup lock with timeout.
        let mut guard = match self.locks.acquire(&request.backup_id).await {
            Ok(guard) => guard,
            Err(EngineError::Busy(_)) => {
                let from = self.peek_state(&request).await;
                let result = TransitionResult::rejected(RejectCause::Busy, from, None);
                self.write_audit(&request, from, &result).await?;
                return Ok(result);
            }
            Err(e) => return Err(e),
        };

        // Step 2: re-read the current state; never trust the caller's view.
        let record = match self.registry.get(&request.backup_id).await {
            Ok(record) => record,
            Err(EngineError::CorruptionDetected(_)) => {
                let result = TransitionResult::rejected(
                    RejectCause::CorruptionDetected,
                    request.target,
                    None,
                );
                self.write_audit(&request, request.target, &result).await?;
                guard.release().await?;
                return Ok(result);
            }
            Err(e) => {
                let result = TransitionResult::rejected(
                    RejectCause::Validation {
                        message: e.to_string(),
                    },
                    request.target,
                    None,
                );
                self.write_audit(&request, request.target, &result).await?;
                guard.release().await?;
                return Err(e);
            }
        };
        let from = record.state;

        // Step 3: validate the edge against the transition graph.
        if !from.can_transition_to(request.target, &request.trigger, request.force) {
            let result = TransitionResult::rejected(
                RejectCause::InvalidTransition {
                    from,
                    to: request.target,
                },
                from,
                None,
            );
            self.write_audit(&request, from, &result).await?;
            guard.release().await?;
            return Ok(result);
        }

        // Step 4: recompute confidence for destructive targets.
        let mut confidence = None;
        if BackupState::is_destructive_target(request.target) && !request.force {
            let breakdown =
                custodian_score::score(&record, &self.policy.scoring, Utc::now());
            let threshold = self.threshold_for(&request);
            confidence = Some(breakdown.confidence);

            if !breakdown.confidence.clears(threshold) {
                let result = TransitionResult::rejected(
                    RejectCause::LowConfidence {
                        confidence: breakdown.confidence.value(),
                        threshold,
                    },
                    from,
                    confidence,
                );
                self.write_audit(&request, from, &result).await?;
                guard.release().await?;
                return Ok(result);
            }
        }

        if request.dry_run {
            let result = TransitionResult::committed(request.target, confidence);
            self.write_audit(&request, from, &result).await?;
            guard.release().await?;
            return Ok(result);
        }

        // Step 5: checkpoint before any side effect.
        let checkpoint = self.checkpoints.save(&record).await?;

        // A slow archive must not be mistaken for a crashed holder.
        self.locks.refresh(&mut guard).await?;

        // Step 6: apply the side effect with bounded retries.
        let receipt = match self.run_side_effect(&request, &record).await {
            Ok(receipt) => receipt,
            Err(message) => {
                // Roll back to the checkpointed record, then surface
                // the record as stuck for operator attention.
                self.registry.put(&checkpoint.record).await?;
                self.checkpoints.remove(&request.backup_id).await?;

                let mut stuck = checkpoint.record.clone();
                stuck.stuck = true;
                self.registry.put(&stuck.finalize()).await?;

                let result = TransitionResult::rejected(
                    RejectCause::SideEffectFailure {
                        message: message.clone(),
                    },
                    from,
                    confidence,
                );
                self.write_audit(&request, from, &result).await?;
                guard.release().await?;
                warn!(backup_id = %request.backup_id, "Transition rolled back; record marked stuck");
                return Ok(result);
            }
        };

        // Step 7: commit the new state.
        let mut updated = record.clone();
        if let Some(receipt) = receipt {
            updated.archive_path = Some(receipt.archive_path);
        }
        if request.target == BackupState::Deleted {
            // Tombstone: payload purged, metadata retained.
            updated.payload_path = None;
            updated.archive_path = None;
        }
        if matches!(request.trigger, TriggerSource::User) {
            updated.stuck = false;
        }
        updated.record_transition(request.target, request.trigger, Utc::now());

        if let Err(e) = self.registry.put(&updated).await {
            self.registry.put(&checkpoint.record).await?;
            self.checkpoints.remove(&request.backup_id).await?;
            guard.release().await?;
            return Err(e);
        }
        self.checkpoints.remove(&request.backup_id).await?;

        let result = TransitionResult::committed(updated.state, confidence);
        self.write_audit(&request, from, &result).await?;
        guard.release().await?;

        info!(
            backup_id = %request.backup_id,
            from = %from,
            to = %updated.state,
            trigger = %request.trigger,
            "Committed transition"
        );
        Ok(result)
    }

    /// Confidence threshold for this request. Emergency disk sweeps are
    /// gated on the emergency floor instead of the normal delete
    /// threshold; everything else uses the per-action threshold.
    fn threshold_for(&self, request: &TransitionRequest) -> f64 {
        match (&request.trigger, request.target) {
            (
                TriggerSource::Disk {
                    level: DiskLevel::Emergency,
                },
                BackupState::Deleted,
            ) => self.policy.thresholds.emergency_floor,
            _ => self.policy.thresholds.for_target(request.target),
        }
    }

    /// Run the archiver/deleter for the target state, retrying with
    /// backoff up to the policy bound. Returns the archive receipt for
    /// archival targets. `Err` carries the final failure message.
    async fn run_side_effect(
        &self,
        request: &TransitionRequest,
        record: &BackupRecord,
    ) -> Result<Option<ArchiveReceipt>, String> {
        let mut attempt = 0u32;

        loop {
            let outcome: EngineResult<Option<ArchiveReceipt>> = match request.target {
                BackupState::Archived => match self.effects.archive(record).await {
                    Ok(receipt) => match self.effects.verify_archive(&receipt).await {
                        Ok(true) => Ok(Some(receipt)),
                        Ok(false) => Err(EngineError::SideEffectFailure {
                            backup_id: record.id.clone(),
                            message: "archived copy failed integrity verification".into(),
                        }),
                        Err(e) => Err(e),
                    },
                    Err(e) => Err(e),
                },
                BackupState::Deleted => self.effects.delete(record).await.map(|_| None),
                // Non-destructive transitions carry no side effect.
                _ => Ok(None),
            };

            match outcome {
                Ok(receipt) => return Ok(receipt),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.policy.retry.max_attempts {
                        return Err(e.to_string());
                    }
                    let backoff = self.policy.retry.backoff_ms(attempt - 1);
                    debug!(
                        backup_id = %record.id,
                        attempt,
                        backoff_ms = backoff,
                        error = %e,
                        "Side effect failed; retrying"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
                }
            }
        }
    }

    /// Best-effort read of the current state for audit entries written
    /// before the record could be locked or loaded.
    async fn peek_state(&self, request: &TransitionRequest) -> BackupState {
        self.registry
            .get(&request.backup_id)
            .await
            .map(|r| r.state)
            .unwrap_or(request.target)
    }

    async fn write_audit(
        &self,
        request: &TransitionRequest,
        from: BackupState,
        result: &TransitionResult,
    ) -> EngineResult<()> {
        self.audit
            .append(PartialAuditEntry {
                timestamp: Utc::now(),
                backup_id: request.backup_id.clone(),
                trigger: request.trigger,
                from,
                requested: request.target,
                outcome: result.outcome,
                new_state: result.new_state,
                confidence: result.confidence_at_decision,
                cause: result.cause.clone(),
                dry_run: request.dry_run,
            })
            .await?;
        Ok(())
    }
}
