//! Durable backup registry and cross-process lock manager.
//!
//! The registry is the only shared mutable state in the system: a keyed
//! store of backup records persisted as one human-inspectable JSON
//! document per record, published atomically (write-new, then rename).
//! Records failing their integrity check on read are quarantined rather
//! than silently accepted, and never block processing of unrelated
//! records.
//!
//! The lock manager provides per-backup mutual exclusion across OS
//! processes via atomic lock-file creation; tokens carry holder identity
//! and a liveness deadline so a crashed holder's lock is detected as
//! stale and force-released instead of deadlocking the engine.

pub mod lock;
pub mod memory;
pub mod store;

pub use lock::{LockGuard, LockManager, LockToken};
pub use memory::InMemoryRegistry;
pub use store::{FileRegistry, Registry};
