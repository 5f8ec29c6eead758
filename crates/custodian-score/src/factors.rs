//! Per-factor score breakdown.

use custodian_types::Confidence;
use serde::{Deserialize, Serialize};

/// One named, weighted scoring factor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorScore {
    /// Factor name.
    pub name: String,

    /// Weight from the scoring policy.
    pub weight: f64,

    /// Normalized [0, 1] safety contribution.
    pub value: f64,

    /// Human-readable evidence for the CLI to explain a decision.
    pub evidence: String,
}

impl FactorScore {
    /// Build a factor, clamping the value into [0, 1].
    pub fn new(name: &str, weight: f64, value: f64, evidence: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            weight,
            value: value.clamp(0.0, 1.0),
            evidence: evidence.into(),
        }
    }
}

/// Complete score with its contributing factors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Contributing factors, in evaluation order.
    pub factors: Vec<FactorScore>,

    /// Damp multiplier applied after the weighted sum (1.0 when no
    /// dynamic usage was detected).
    pub damp: f64,

    /// Final clamped confidence.
    pub confidence: Confidence,
}

impl ScoreBreakdown {
    /// Combine factors into a weighted average, then damp.
    pub fn combine(factors: Vec<FactorScore>, damp: f64) -> Self {
        let total_weight: f64 = factors.iter().map(|f| f.weight).sum();
        let weighted: f64 = factors.iter().map(|f| f.value * f.weight).sum();

        let base = if total_weight > 0.0 {
            weighted / total_weight
        } else {
            0.0
        };

        Self {
            factors,
            damp,
            confidence: Confidence::new(base * damp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factor_clamps_value() {
        let f = FactorScore::new("age", 0.25, 1.8, "old");
        assert_eq!(f.value, 1.0);
        let f = FactorScore::new("age", 0.25, -0.5, "new");
        assert_eq!(f.value, 0.0);
    }

    #[test]
    fn test_combine_is_weighted_average() {
        let breakdown = ScoreBreakdown::combine(
            vec![
                FactorScore::new("a", 1.0, 1.0, ""),
                FactorScore::new("b", 1.0, 0.0, ""),
            ],
            1.0,
        );
        assert!((breakdown.confidence.value() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_damp_scales_result() {
        let breakdown =
            ScoreBreakdown::combine(vec![FactorScore::new("a", 1.0, 1.0, "")], 0.05);
        assert!((breakdown.confidence.value() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_zero_weight_is_zero_confidence() {
        let breakdown = ScoreBreakdown::combine(vec![], 1.0);
        assert_eq!(breakdown.confidence.value(), 0.0);
    }
}
