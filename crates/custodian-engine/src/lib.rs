//! Transition coordination for the backup lifecycle.
//!
//! The coordinator is the single write path for lifecycle transitions:
//! it locks the backup, re-reads its state, validates the requested
//! edge, gates destructive actions on a freshly computed confidence,
//! checkpoints before applying side effects, and commits or rolls back
//! atomically. Every submit call leaves exactly one audit entry.

pub mod audit;
pub mod checkpoint;
pub mod coordinator;
pub mod effects;
pub mod queue;

pub use audit::{AuditEntry, AuditSink, FileAuditSink, MemoryAuditSink, verify_chain};
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use coordinator::Coordinator;
pub use effects::{ArchiveReceipt, FsSideEffector, ScriptedSideEffector, SideEffector};
pub use queue::{QueuedRequest, RequestQueue};
