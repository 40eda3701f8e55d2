// src/scoring.rs
//
// Strategy seams for the two predictive collaborators. In the deployed
// system these are learned models; the controller only needs "some function
// of the presence vector", so the fairness/override/clamping logic stays
// testable with deterministic stand-ins.

use crate::types::{PresenceVector, LANE_COUNT};
use anyhow::Result;

/// Maps a presence vector to a per-lane preference. Weights must be
/// non-negative; they do not need to sum to one (the selector normalizes).
pub trait LaneScorer {
    fn score(&self, presence: &PresenceVector) -> Result<[f64; LANE_COUNT]>;
}

/// Maps a presence vector to a raw green-time estimate in seconds. The
/// duration selector clamps the result, so estimates may be out of range.
pub trait GreenTimeEstimator {
    fn estimate(&self, presence: &PresenceVector) -> Result<f64>;
}

/// Shipped scorer: prefer lanes with vehicles waiting, with a small uniform
/// prior so an all-empty intersection still ranks deterministically.
#[derive(Debug, Clone, Default)]
pub struct DemandScorer;

impl LaneScorer for DemandScorer {
    fn score(&self, presence: &PresenceVector) -> Result<[f64; LANE_COUNT]> {
        let mut weights = [0.0; LANE_COUNT];
        for (w, &bit) in weights.iter_mut().zip(presence.iter()) {
            *w = if bit > 0 { 1.0 } else { 0.1 };
        }
        Ok(weights)
    }
}

/// Shipped estimator: a base allocation plus a fixed share per occupied lane.
#[derive(Debug, Clone)]
pub struct DemandEstimator {
    pub base_secs: f64,
    pub per_lane_secs: f64,
}

impl Default for DemandEstimator {
    fn default() -> Self {
        Self {
            base_secs: 10.0,
            per_lane_secs: 6.0,
        }
    }
}

impl GreenTimeEstimator for DemandEstimator {
    fn estimate(&self, presence: &PresenceVector) -> Result<f64> {
        let total: u8 = presence.iter().sum();
        Ok(self.base_secs + self.per_lane_secs * f64::from(total))
    }
}
