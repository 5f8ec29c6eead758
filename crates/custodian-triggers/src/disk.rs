//! Disk pressure trigger.
//!
//! Samples free space, classifies usage against the configured
//! thresholds (with a hysteresis margin on de-escalation so the level
//! does not oscillate around a threshold), and on an escalation plans a
//! sweep over cleanable records sized to bring projected usage below
//! threshold-minus-hysteresis.

use chrono::{DateTime, Utc};
use custodian_types::{
    BackupRecord, BackupState, ConfidenceThresholds, DiskLevel, DiskPolicy, EngineResult,
    ScoringPolicy, SweepStrategy, TransitionRequest, TriggerSource,
};
use tracing::{debug, info};
use uuid::Uuid;

/// One free-space observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskSample {
    /// Filesystem capacity in bytes.
    pub total_bytes: u64,

    /// Bytes still available.
    pub available_bytes: u64,
}

impl DiskSample {
    /// Used space as a percentage of capacity.
    pub fn used_pct(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        let used = self.total_bytes.saturating_sub(self.available_bytes);
        used as f64 / self.total_bytes as f64 * 100.0
    }
}

/// Source of free-space samples.
pub trait DiskSampler: Send + Sync {
    /// Take one sample.
    fn sample(&self) -> EngineResult<DiskSample>;
}

/// Fixed sample, for tests and simulations.
pub struct StaticSampler(pub DiskSample);

impl DiskSampler for StaticSampler {
    fn sample(&self) -> EngineResult<DiskSample> {
        Ok(self.0)
    }
}

/// statvfs-backed sampler for the filesystem holding `path`.
#[cfg(unix)]
pub struct StatvfsSampler {
    path: std::path::PathBuf,
}

#[cfg(unix)]
impl StatvfsSampler {
    /// Sample the filesystem containing `path`.
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[cfg(unix)]
impl DiskSampler for StatvfsSampler {
    fn sample(&self) -> EngineResult<DiskSample> {
        use std::os::unix::ffi::OsStrExt;

        let cpath = std::ffi::CString::new(self.path.as_os_str().as_bytes())
            .map_err(|e| custodian_types::EngineError::Storage(e.to_string()))?;

        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::statvfs(cpath.as_ptr(), &mut stat) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error().into());
        }

        let frsize = stat.f_frsize as u64;
        Ok(DiskSample {
            total_bytes: stat.f_blocks as u64 * frsize,
            available_bytes: stat.f_bavail as u64 * frsize,
        })
    }
}

/// Pressure classifier with hysteresis on de-escalation.
///
/// Escalation happens the moment a threshold is crossed; de-escalation
/// waits until usage falls below the previous level's threshold minus
/// the hysteresis margin.
pub struct DiskMonitor {
    policy: DiskPolicy,
    level: DiskLevel,
}

impl DiskMonitor {
    /// Start at normal pressure.
    pub fn new(policy: DiskPolicy) -> Self {
        Self {
            policy,
            level: DiskLevel::Normal,
        }
    }

    /// The current effective level.
    pub fn level(&self) -> DiskLevel {
        self.level
    }

    /// Observe one sample. Returns the effective level and whether this
    /// observation escalated across a threshold (the signal to sweep).
    pub fn observe(&mut self, used_pct: f64) -> (DiskLevel, bool) {
        let raw = self.policy.classify(used_pct);

        if raw > self.level {
            info!(used_pct, from = %self.level, to = %raw, "Disk pressure escalated");
            self.level = raw;
            return (self.level, true);
        }

        if raw < self.level {
            // De-escalate only once usage clears the hysteresis margin.
            if used_pct < self.policy.relief_target(self.level) {
                debug!(used_pct, from = %self.level, to = %raw, "Disk pressure de-escalated");
                self.level = raw;
            }
        }

        (self.level, false)
    }
}

/// A planned relief sweep.
#[derive(Debug, Clone)]
pub struct SweepPlan {
    /// Batch id shared by every request in the sweep, so the remainder
    /// can be cancelled once relief is reached.
    pub batch_id: Uuid,

    /// Pressure level the sweep answers.
    pub level: DiskLevel,

    /// Requests, in execution order.
    pub requests: Vec<TransitionRequest>,

    /// Projected used percentage after the whole batch commits.
    pub projected_used_pct: f64,
}

/// Plan a sweep over `cleanable` records to relieve `level`.
///
/// Selection follows the configured strategy; the batch stops growing
/// as soon as projected usage falls below threshold-minus-hysteresis
/// (except the nuclear strategy, which takes every eligible record).
/// Records below the emergency confidence floor are excluded: relieving
/// them requires a user force this adapter never sets. Returns `None`
/// when there is nothing eligible to sweep.
pub fn plan_sweep(
    cleanable: &[BackupRecord],
    sample: &DiskSample,
    level: DiskLevel,
    policy: &DiskPolicy,
    scoring: &ScoringPolicy,
    thresholds: &ConfidenceThresholds,
    now: DateTime<Utc>,
) -> Option<SweepPlan> {
    if level == DiskLevel::Normal || sample.total_bytes == 0 {
        return None;
    }

    let floor = match level {
        DiskLevel::Emergency => thresholds.emergency_floor,
        _ => thresholds.delete,
    };

    let mut candidates: Vec<&BackupRecord> = cleanable
        .iter()
        .filter(|r| r.state == BackupState::Cleanable && !r.stuck)
        .filter(|r| {
            custodian_score::score(r, scoring, now)
                .confidence
                .clears(floor)
        })
        .collect();

    match policy.strategy {
        SweepStrategy::OldestFirst | SweepStrategy::Nuclear => {
            candidates.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        }
        SweepStrategy::LargestFirst => {
            candidates.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));
        }
        SweepStrategy::ConfidenceOrdered => {
            candidates.sort_by(|a, b| {
                let ca = custodian_score::score(a, scoring, now).confidence.value();
                let cb = custodian_score::score(b, scoring, now).confidence.value();
                cb.partial_cmp(&ca).unwrap_or(std::cmp::Ordering::Equal)
            });
        }
    }

    let relief_target = policy.relief_target(level);
    let mut used = sample.total_bytes.saturating_sub(sample.available_bytes);
    let mut selected = Vec::new();

    for record in candidates {
        let projected = used as f64 / sample.total_bytes as f64 * 100.0;
        if policy.strategy != SweepStrategy::Nuclear && projected < relief_target {
            break;
        }
        used = used.saturating_sub(record.size_bytes);
        selected.push(record);
    }

    if selected.is_empty() {
        return None;
    }

    let batch_id = Uuid::new_v4();
    let requests = selected
        .iter()
        .map(|r| {
            TransitionRequest::new(
                r.id.clone(),
                BackupState::Deleted,
                TriggerSource::Disk { level },
            )
        })
        .collect();

    let projected_used_pct = used as f64 / sample.total_bytes as f64 * 100.0;
    info!(
        level = %level,
        batch = selected.len(),
        projected_used_pct,
        "Planned disk relief sweep"
    );

    Some(SweepPlan {
        batch_id,
        level,
        requests,
        projected_used_pct,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use custodian_types::{BackupId, BackupKind};

    const GIB: u64 = 1024 * 1024 * 1024;

    fn cleanable(id: &str, age_days: i64, size: u64) -> BackupRecord {
        let now = Utc::now();
        let mut r = BackupRecord::new(
            BackupId::new(id),
            size,
            BackupKind::SourceCode,
            now - Duration::days(age_days),
        );
        r.state = BackupState::Cleanable;
        r.merge_confirmed = true;
        r.last_accessed_at = now - Duration::days(age_days);
        r.finalize()
    }

    fn sample(total: u64, used: u64) -> DiskSample {
        DiskSample {
            total_bytes: total,
            available_bytes: total - used,
        }
    }

    #[test]
    fn test_used_pct() {
        assert_eq!(sample(100 * GIB, 96 * GIB).used_pct(), 96.0);
        assert_eq!(
            DiskSample {
                total_bytes: 0,
                available_bytes: 0
            }
            .used_pct(),
            0.0
        );
    }

    #[test]
    fn test_monitor_escalates_immediately_deescalates_with_hysteresis() {
        let mut monitor = DiskMonitor::new(DiskPolicy::default());

        assert_eq!(monitor.observe(50.0), (DiskLevel::Normal, false));
        assert_eq!(monitor.observe(96.0), (DiskLevel::Emergency, true));

        // Back under the threshold but inside the hysteresis band:
        // still emergency, no oscillation.
        assert_eq!(monitor.observe(94.0), (DiskLevel::Emergency, false));

        // Below threshold minus hysteresis: de-escalates.
        let (level, escalated) = monitor.observe(80.0);
        assert_eq!(level, DiskLevel::Warning);
        assert!(!escalated);
    }

    #[test]
    fn test_emergency_sweep_stops_at_relief_target() {
        // 96% of 100 GiB used; emergency at 95 with 2% hysteresis:
        // the sweep must project below 93% and then stop.
        let records = vec![
            cleanable("oldest", 400, 2 * GIB),
            cleanable("older", 300, 2 * GIB),
            cleanable("newer", 200, 2 * GIB),
            cleanable("newest", 100, 2 * GIB),
        ];
        let plan = plan_sweep(
            &records,
            &sample(100 * GIB, 96 * GIB),
            DiskLevel::Emergency,
            &DiskPolicy::default(),
            &ScoringPolicy::default(),
            &ConfidenceThresholds::default(),
            Utc::now(),
        )
        .unwrap();

        // Two records (4 GiB) bring usage to 92% < 93%; a third would
        // transition more backups than required.
        assert_eq!(plan.requests.len(), 2);
        assert!(plan.projected_used_pct < 93.0);

        // Oldest first.
        assert_eq!(plan.requests[0].backup_id.as_str(), "oldest");
        assert_eq!(plan.requests[1].backup_id.as_str(), "older");

        for request in &plan.requests {
            assert_eq!(request.target, BackupState::Deleted);
            assert!(!request.force);
        }
    }

    #[test]
    fn test_sweep_excludes_records_below_emergency_floor() {
        // Dynamic usage drives confidence under the floor; the sweep
        // must not select it without force.
        let mut risky = cleanable("risky", 400, 4 * GIB);
        risky.dynamic_usage = true;
        let records = vec![risky.finalize(), cleanable("safe", 300, 4 * GIB)];

        let plan = plan_sweep(
            &records,
            &sample(100 * GIB, 96 * GIB),
            DiskLevel::Emergency,
            &DiskPolicy::default(),
            &ScoringPolicy::default(),
            &ConfidenceThresholds::default(),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(plan.requests.len(), 1);
        assert_eq!(plan.requests[0].backup_id.as_str(), "safe");
    }

    #[test]
    fn test_largest_first_strategy() {
        let policy = DiskPolicy {
            strategy: SweepStrategy::LargestFirst,
            ..DiskPolicy::default()
        };
        let records = vec![
            cleanable("small", 400, GIB),
            cleanable("large", 100, 8 * GIB),
        ];

        let plan = plan_sweep(
            &records,
            &sample(100 * GIB, 96 * GIB),
            DiskLevel::Emergency,
            &policy,
            &ScoringPolicy::default(),
            &ConfidenceThresholds::default(),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(plan.requests[0].backup_id.as_str(), "large");
        assert_eq!(plan.requests.len(), 1);
    }

    #[test]
    fn test_nuclear_takes_every_eligible_record() {
        let policy = DiskPolicy {
            strategy: SweepStrategy::Nuclear,
            ..DiskPolicy::default()
        };
        let records = vec![
            cleanable("a", 400, GIB),
            cleanable("b", 300, GIB),
            cleanable("c", 200, GIB),
        ];

        let plan = plan_sweep(
            &records,
            &sample(100 * GIB, 96 * GIB),
            DiskLevel::Emergency,
            &policy,
            &ScoringPolicy::default(),
            &ConfidenceThresholds::default(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(plan.requests.len(), 3);
    }

    #[test]
    fn test_no_sweep_at_normal_pressure_or_without_candidates() {
        let records = vec![cleanable("a", 400, GIB)];
        assert!(plan_sweep(
            &records,
            &sample(100 * GIB, 50 * GIB),
            DiskLevel::Normal,
            &DiskPolicy::default(),
            &ScoringPolicy::default(),
            &ConfidenceThresholds::default(),
            Utc::now(),
        )
        .is_none());

        assert!(plan_sweep(
            &[],
            &sample(100 * GIB, 96 * GIB),
            DiskLevel::Emergency,
            &DiskPolicy::default(),
            &ScoringPolicy::default(),
            &ConfidenceThresholds::default(),
            Utc::now(),
        )
        .is_none());
    }
}
