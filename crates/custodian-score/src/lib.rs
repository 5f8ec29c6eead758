//! Confidence scoring for destructive lifecycle decisions.
//!
//! `score` is a pure function from a backup record and the scoring
//! policy to a [0, 1] safety confidence: how safe it is to archive or
//! delete the payload. It performs no IO, takes `now` as an explicit
//! argument, and is recomputed immediately before every destructive
//! decision — a previously computed value is never trusted.

pub mod factors;
pub mod scorer;

pub use factors::{FactorScore, ScoreBreakdown};
pub use scorer::score;
