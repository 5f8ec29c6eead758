//! The scoring function.

use chrono::{DateTime, Utc};
use custodian_types::{BackupRecord, ScoringPolicy};

use crate::factors::{FactorScore, ScoreBreakdown};

/// Compute the safety confidence for acting destructively on `record`.
///
/// Deterministic in `(record, policy, now)`. Each factor is normalized
/// to [0, 1] where 1 means "safe to remove" and weighted per policy:
/// - age: older payloads are safer to remove;
/// - merge confirmation: confirmed work is recoverable from history;
/// - size: larger payloads warrant more scrutiny;
/// - access recency: a recently touched payload is likely still wanted;
/// - references: test/build relationships lower safety sharply;
/// - dynamic usage: drives the score toward zero via the policy damp,
///   overridable only by an explicit force at the coordinator.
pub fn score(record: &BackupRecord, policy: &ScoringPolicy, now: DateTime<Utc>) -> ScoreBreakdown {
    let mut factors = Vec::with_capacity(5);

    let age_days = (record.age(now).num_seconds() as f64 / 86_400.0).max(0.0);
    let age_value = (age_days / policy.age_saturation_days).min(1.0);
    factors.push(FactorScore::new(
        "age",
        policy.age_weight,
        age_value,
        format!("{:.1} days old", age_days),
    ));

    let merge_value = if record.merge_confirmed { 1.0 } else { 0.0 };
    factors.push(FactorScore::new(
        "merge_confirmation",
        policy.merge_weight,
        merge_value,
        if record.merge_confirmed {
            "merge confirmed".to_string()
        } else {
            "no merge confirmation".to_string()
        },
    ));

    let size_ratio = (record.size_bytes as f64 / policy.size_saturation_bytes as f64).min(1.0);
    factors.push(FactorScore::new(
        "payload_size",
        policy.size_weight,
        1.0 - size_ratio,
        format!("{} bytes", record.size_bytes),
    ));

    let idle_days = ((now - record.last_accessed_at).num_seconds() as f64 / 86_400.0).max(0.0);
    let recency_value = (idle_days / policy.recency_window_days).min(1.0);
    factors.push(FactorScore::new(
        "access_recency",
        policy.recency_weight,
        recency_value,
        format!("last accessed {:.1} days ago", idle_days),
    ));

    // Squared so that even a single reference costs disproportionately.
    let ref_ratio = (record.reference_count as f64 / policy.reference_saturation as f64).min(1.0);
    let reference_value = (1.0 - ref_ratio).powi(2);
    factors.push(FactorScore::new(
        "references",
        policy.reference_weight,
        reference_value,
        format!("{} referencing relationships", record.reference_count),
    ));

    let damp = if record.dynamic_usage {
        policy.dynamic_usage_damp
    } else {
        1.0
    };

    ScoreBreakdown::combine(factors, damp)
}
