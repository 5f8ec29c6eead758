//! Shared types for the Custodian backup lifecycle engine.
//!
//! This crate holds the data model every other Custodian crate speaks:
//! backup records and their lifecycle states, transition requests and
//! results, trigger sources, the policy configuration, and the shared
//! error taxonomy. It deliberately has no IO so the scorer and the
//! state machine stay pure.

pub mod error;
pub mod id;
pub mod policy;
pub mod record;
pub mod request;
pub mod state;
pub mod trigger;

pub use error::{EngineError, EngineResult};
pub use id::{BackupId, HolderId};
pub use policy::{
    ConfidenceThresholds, DiskPolicy, EnginePolicy, LockPolicy, RetryPolicy, ScoringPolicy,
    StateTimeouts, SweepStrategy,
};
pub use record::{BackupKind, BackupRecord, Confidence, StateTransition};
pub use request::{Outcome, RejectCause, TransitionRequest, TransitionResult};
pub use state::BackupState;
pub use trigger::{DiskLevel, HookKind, RequestPriority, TriggerSource};
