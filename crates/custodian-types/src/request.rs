//! Transition requests and results.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::id::BackupId;
use crate::record::Confidence;
use crate::state::BackupState;
use crate::trigger::{RequestPriority, TriggerSource};

/// A request to move one backup to a target state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRequest {
    /// Backup to transition.
    pub backup_id: BackupId,

    /// Requested target state.
    pub target: BackupState,

    /// Source that produced the request.
    pub trigger: TriggerSource,

    /// Dispatch priority under contention.
    pub priority: RequestPriority,

    /// Bypass the confidence gate (user trigger only). Never bypasses
    /// edge legality or integrity checks.
    pub force: bool,

    /// Simulate: validate and score, but commit nothing.
    pub dry_run: bool,
}

impl TransitionRequest {
    /// Build a request with the trigger's default priority.
    pub fn new(backup_id: BackupId, target: BackupState, trigger: TriggerSource) -> Self {
        let priority = trigger.priority();
        Self {
            backup_id,
            target,
            trigger,
            priority,
            force: false,
            dry_run: false,
        }
    }

    /// Mark the request as forced.
    pub fn with_force(mut self) -> Self {
        self.force = true;
        self
    }

    /// Mark the request as a dry run.
    pub fn with_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Structural validation, before any state is consulted.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.backup_id.is_empty() {
            return Err(EngineError::Validation("empty backup id".into()));
        }
        if self.target == BackupState::Created {
            return Err(EngineError::Validation(
                "no transition may target the created state".into(),
            ));
        }
        if self.force && !matches!(self.trigger, TriggerSource::User) {
            return Err(EngineError::Validation(format!(
                "force requires the user trigger, got {}",
                self.trigger
            )));
        }
        Ok(())
    }
}

/// Whether a submit call changed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The transition was applied and persisted.
    Committed,
    /// The request was rejected; state is unchanged.
    Rejected,
}

/// Why a request was rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "kebab-case")]
pub enum RejectCause {
    /// Malformed request.
    Validation { message: String },

    /// The requested edge is not in the transition graph.
    InvalidTransition {
        from: BackupState,
        to: BackupState,
    },

    /// Lock acquisition timed out; retryable.
    Busy,

    /// Confidence below the action's threshold; needs a human decision.
    LowConfidence { confidence: f64, threshold: f64 },

    /// The archiver/deleter failed after retries; state was rolled back.
    SideEffectFailure { message: String },

    /// The record failed its integrity check and was quarantined.
    CorruptionDetected,
}

impl RejectCause {
    /// A concrete next action for the operator.
    pub fn next_action(&self) -> &'static str {
        match self {
            RejectCause::Validation { .. } => "fix the request and resubmit",
            RejectCause::InvalidTransition { .. } => {
                "check `custodian status` for the record's current state"
            }
            RejectCause::Busy => "another process holds the lock; retry shortly",
            RejectCause::LowConfidence { .. } => {
                "review the record, then rerun with --force to override"
            }
            RejectCause::SideEffectFailure { .. } => {
                "the record is marked stuck; inspect storage and retry"
            }
            RejectCause::CorruptionDetected => "run repair on the quarantined record",
        }
    }
}

impl std::fmt::Display for RejectCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectCause::Validation { message } => write!(f, "invalid request: {}", message),
            RejectCause::InvalidTransition { from, to } => {
                write!(f, "transition {} -> {} is not allowed", from, to)
            }
            RejectCause::Busy => write!(f, "busy: lock acquisition timed out"),
            RejectCause::LowConfidence {
                confidence,
                threshold,
            } => write!(
                f,
                "confidence {:.2} below threshold {:.2}",
                confidence, threshold
            ),
            RejectCause::SideEffectFailure { message } => {
                write!(f, "side effect failed: {}", message)
            }
            RejectCause::CorruptionDetected => {
                write!(f, "record failed integrity check and was quarantined")
            }
        }
    }
}

/// Result of a submit call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionResult {
    /// Committed or rejected.
    pub outcome: Outcome,

    /// Rejection cause, if rejected.
    pub cause: Option<RejectCause>,

    /// State after the call (unchanged on rejection).
    pub new_state: BackupState,

    /// Confidence computed for the decision, when one was computed.
    pub confidence_at_decision: Option<Confidence>,
}

impl TransitionResult {
    /// A committed result.
    pub fn committed(new_state: BackupState, confidence: Option<Confidence>) -> Self {
        Self {
            outcome: Outcome::Committed,
            cause: None,
            new_state,
            confidence_at_decision: confidence,
        }
    }

    /// A rejected result; `current_state` is the unchanged state.
    pub fn rejected(
        cause: RejectCause,
        current_state: BackupState,
        confidence: Option<Confidence>,
    ) -> Self {
        Self {
            outcome: Outcome::Rejected,
            cause: Some(cause),
            new_state: current_state,
            confidence_at_decision: confidence,
        }
    }

    /// Whether the transition was committed.
    pub fn is_committed(&self) -> bool {
        self.outcome == Outcome::Committed
    }
}
