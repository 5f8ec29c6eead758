//! Policy configuration, read-only to the engine.
//!
//! Everything an operator may tune lives here: per-state timeouts,
//! confidence thresholds per destructive action, disk thresholds with
//! hysteresis, the sweep strategy, scoring weights, and lock/retry
//! behavior. The engine never hard-codes these values.

use serde::{Deserialize, Serialize};

use crate::trigger::DiskLevel;

/// Complete engine policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnginePolicy {
    /// Per-state timeouts for the time trigger.
    #[serde(default)]
    pub state_timeouts: StateTimeouts,

    /// Confidence thresholds per destructive action.
    #[serde(default)]
    pub thresholds: ConfidenceThresholds,

    /// Disk pressure thresholds and sweep strategy.
    #[serde(default)]
    pub disk: DiskPolicy,

    /// Scoring factor weights.
    #[serde(default)]
    pub scoring: ScoringPolicy,

    /// Cross-process lock behavior.
    #[serde(default)]
    pub locks: LockPolicy,

    /// Side-effect retry behavior.
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// How long a record may sit in a state before the time trigger acts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTimeouts {
    /// Pending with no merge: abandonment window, seconds.
    #[serde(default = "default_pending_abandon_secs")]
    pub pending_abandon_secs: u64,

    /// Confirmed retention before the record becomes cleanable, seconds.
    #[serde(default = "default_confirmed_retention_secs")]
    pub confirmed_retention_secs: u64,

    /// Archive retention before deletion, seconds.
    #[serde(default = "default_archive_retention_secs")]
    pub archive_retention_secs: u64,
}

impl Default for StateTimeouts {
    fn default() -> Self {
        Self {
            pending_abandon_secs: default_pending_abandon_secs(),
            confirmed_retention_secs: default_confirmed_retention_secs(),
            archive_retention_secs: default_archive_retention_secs(),
        }
    }
}

/// Confidence thresholds per destructive action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    /// Minimum confidence to archive.
    #[serde(default = "default_archive_threshold")]
    pub archive: f64,

    /// Minimum confidence to delete.
    #[serde(default = "default_delete_threshold")]
    pub delete: f64,

    /// Floor below which even an emergency sweep will not delete
    /// without an explicit user force.
    #[serde(default = "default_emergency_floor")]
    pub emergency_floor: f64,
}

impl ConfidenceThresholds {
    /// Threshold for a destructive target state.
    pub fn for_target(&self, target: crate::state::BackupState) -> f64 {
        match target {
            crate::state::BackupState::Archived => self.archive,
            crate::state::BackupState::Deleted => self.delete,
            _ => 0.0,
        }
    }
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            archive: default_archive_threshold(),
            delete: default_delete_threshold(),
            emergency_floor: default_emergency_floor(),
        }
    }
}

/// Strategy for selecting the disk sweep batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SweepStrategy {
    /// Oldest cleanable records first.
    OldestFirst,
    /// Largest payloads first.
    LargestFirst,
    /// Highest confidence (safest deletions) first.
    ConfidenceOrdered,
    /// Nearly all cleanable records, regardless of the relief target.
    Nuclear,
}

/// Disk monitor thresholds, in used-space percent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskPolicy {
    /// Warning threshold.
    #[serde(default = "default_warning_pct")]
    pub warning_used_pct: f64,

    /// Critical threshold.
    #[serde(default = "default_critical_pct")]
    pub critical_used_pct: f64,

    /// Emergency threshold.
    #[serde(default = "default_emergency_pct")]
    pub emergency_used_pct: f64,

    /// De-escalation margin below a threshold, preventing oscillation.
    #[serde(default = "default_hysteresis_pct")]
    pub hysteresis_pct: f64,

    /// Batch selection strategy.
    #[serde(default = "default_strategy")]
    pub strategy: SweepStrategy,
}

impl DiskPolicy {
    /// Classify a used-space percentage.
    pub fn classify(&self, used_pct: f64) -> DiskLevel {
        if used_pct >= self.emergency_used_pct {
            DiskLevel::Emergency
        } else if used_pct >= self.critical_used_pct {
            DiskLevel::Critical
        } else if used_pct >= self.warning_used_pct {
            DiskLevel::Warning
        } else {
            DiskLevel::Normal
        }
    }

    /// The usage a sweep must get below to relieve `level`:
    /// threshold minus hysteresis.
    pub fn relief_target(&self, level: DiskLevel) -> f64 {
        let threshold = match level {
            DiskLevel::Emergency => self.emergency_used_pct,
            DiskLevel::Critical => self.critical_used_pct,
            DiskLevel::Warning => self.warning_used_pct,
            DiskLevel::Normal => return 0.0,
        };
        threshold - self.hysteresis_pct
    }
}

impl Default for DiskPolicy {
    fn default() -> Self {
        Self {
            warning_used_pct: default_warning_pct(),
            critical_used_pct: default_critical_pct(),
            emergency_used_pct: default_emergency_pct(),
            hysteresis_pct: default_hysteresis_pct(),
            strategy: default_strategy(),
        }
    }
}

/// Named scoring weights and normalization knobs.
///
/// The source material describes the factors qualitatively; these are
/// the tunable constants an operator adjusts, not values the scorer
/// invents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringPolicy {
    /// Weight of payload age (older is safer).
    #[serde(default = "default_age_weight")]
    pub age_weight: f64,

    /// Weight of merge confirmation.
    #[serde(default = "default_merge_weight")]
    pub merge_weight: f64,

    /// Weight of payload size (larger warrants more scrutiny).
    #[serde(default = "default_size_weight")]
    pub size_weight: f64,

    /// Weight of access recency (recent access lowers safety).
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,

    /// Weight of test/build reference relationships.
    #[serde(default = "default_reference_weight")]
    pub reference_weight: f64,

    /// Multiplier applied when dynamic/runtime usage is detected,
    /// driving the score toward zero.
    #[serde(default = "default_dynamic_usage_damp")]
    pub dynamic_usage_damp: f64,

    /// Age at which the age factor saturates, days.
    #[serde(default = "default_age_saturation_days")]
    pub age_saturation_days: f64,

    /// Payload size at which the size penalty saturates, bytes.
    #[serde(default = "default_size_saturation_bytes")]
    pub size_saturation_bytes: u64,

    /// Window within which access counts as recent, days.
    #[serde(default = "default_recency_window_days")]
    pub recency_window_days: f64,

    /// Reference count at which the reference penalty saturates.
    #[serde(default = "default_reference_saturation")]
    pub reference_saturation: u32,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            age_weight: default_age_weight(),
            merge_weight: default_merge_weight(),
            size_weight: default_size_weight(),
            recency_weight: default_recency_weight(),
            reference_weight: default_reference_weight(),
            dynamic_usage_damp: default_dynamic_usage_damp(),
            age_saturation_days: default_age_saturation_days(),
            size_saturation_bytes: default_size_saturation_bytes(),
            recency_window_days: default_recency_window_days(),
            reference_saturation: default_reference_saturation(),
        }
    }
}

/// Cross-process lock behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockPolicy {
    /// How long an acquirer waits before giving up with Busy, ms.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Poll interval while waiting, ms.
    #[serde(default = "default_lock_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Holder liveness window; a lock older than this is stale, seconds.
    #[serde(default = "default_liveness_ttl_secs")]
    pub liveness_ttl_secs: u64,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            acquire_timeout_ms: default_acquire_timeout_ms(),
            retry_interval_ms: default_lock_retry_interval_ms(),
            liveness_ttl_secs: default_liveness_ttl_secs(),
        }
    }
}

/// Side-effect retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts before the record is surfaced as stuck.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay, ms.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff multiplier per attempt.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Backoff delay before retry `attempt` (zero-based).
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let factor = self.backoff_multiplier.powi(attempt as i32);
        (self.initial_backoff_ms as f64 * factor) as u64
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

// Default value helpers

fn default_pending_abandon_secs() -> u64 {
    14 * 24 * 3600
}

fn default_confirmed_retention_secs() -> u64 {
    30 * 24 * 3600
}

fn default_archive_retention_secs() -> u64 {
    90 * 24 * 3600
}

fn default_archive_threshold() -> f64 {
    0.75
}

fn default_delete_threshold() -> f64 {
    0.90
}

fn default_emergency_floor() -> f64 {
    0.30
}

fn default_warning_pct() -> f64 {
    70.0
}

fn default_critical_pct() -> f64 {
    85.0
}

fn default_emergency_pct() -> f64 {
    95.0
}

fn default_hysteresis_pct() -> f64 {
    2.0
}

fn default_strategy() -> SweepStrategy {
    SweepStrategy::OldestFirst
}

fn default_age_weight() -> f64 {
    0.25
}

fn default_merge_weight() -> f64 {
    0.20
}

fn default_size_weight() -> f64 {
    0.10
}

fn default_recency_weight() -> f64 {
    0.15
}

fn default_reference_weight() -> f64 {
    0.30
}

fn default_dynamic_usage_damp() -> f64 {
    0.05
}

fn default_age_saturation_days() -> f64 {
    90.0
}

fn default_size_saturation_bytes() -> u64 {
    100 * 1024 * 1024
}

fn default_recency_window_days() -> f64 {
    7.0
}

fn default_reference_saturation() -> u32 {
    5
}

fn default_acquire_timeout_ms() -> u64 {
    5000
}

fn default_lock_retry_interval_ms() -> u64 {
    50
}

fn default_liveness_ttl_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_backoff_multiplier() -> f64 {
    2.0
}
