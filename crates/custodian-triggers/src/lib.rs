//! Trigger adapters: each translates an external event source into
//! transition requests for the coordinator.
//!
//! The four sources run as independent processes: a synchronous hook
//! inside a version-control operation, a polling time daemon, a disk
//! pressure monitor, and the interactive CLI. None of them mutate
//! records themselves; they only produce requests.

pub mod disk;
pub mod githook;
pub mod spool;
pub mod time;
pub mod user;

pub use disk::{DiskMonitor, DiskSample, DiskSampler, StaticSampler, SweepPlan, plan_sweep};
pub use githook::{GitHookTrigger, requests_for_event};
pub use spool::{EventSpool, HookEvent};
pub use time::{TimeTrigger, eligible_requests};
pub use user::UserTrigger;

#[cfg(unix)]
pub use disk::StatvfsSampler;
