// src/selector.rs

use crate::scoring::LaneScorer;
use crate::types::{LaneId, PresenceVector, RushHourConfig, SelectionReason, LANE_COUNT};
use anyhow::Result;
use tracing::{debug, warn};

const NORMALIZE_EPSILON: f64 = 1e-9;

/// Last selected lane plus how many times in a row the scorer has asked for
/// it again. Mutated only by the selector.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectionHistory {
    pub last: Option<LaneId>,
    pub repeat_count: u32,
}

/// Picks the next green lane from model scores, rush-hour weighting,
/// fairness history and the emergency override.
pub struct LaneSelector {
    history: SelectionHistory,
    max_same_lane: u32,
    rush_hour: RushHourConfig,
}

impl LaneSelector {
    pub fn new(max_same_lane: u32, rush_hour: RushHourConfig) -> Self {
        Self {
            history: SelectionHistory::default(),
            max_same_lane,
            rush_hour,
        }
    }

    pub fn history(&self) -> SelectionHistory {
        self.history
    }

    /// Decide the next lane. An emergency override short-circuits everything
    /// and leaves the fairness history untouched.
    pub fn select(
        &mut self,
        presence: &PresenceVector,
        hour: u32,
        emergency: Option<LaneId>,
        scorer: &dyn LaneScorer,
    ) -> Result<(LaneId, SelectionReason)> {
        if let Some(lane) = emergency {
            warn!(lane = %lane, "emergency override active");
            return Ok((lane, SelectionReason::EmergencyOverride));
        }

        let scores = scorer.score(presence)?;
        let weighted = self.weight_and_normalize(scores, hour);

        // Lane indices, best first. Stable sort keeps ties deterministic.
        let mut order: Vec<usize> = (0..LANE_COUNT).collect();
        order.sort_by(|&a, &b| {
            weighted[b]
                .partial_cmp(&weighted[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let candidate = LaneId::from_index(order[0]).unwrap_or(LaneId::Lane1);

        if self.history.last == Some(candidate) {
            self.history.repeat_count += 1;
        } else {
            self.history.repeat_count = 0;
        }

        let (chosen, reason) = if self.history.repeat_count >= self.max_same_lane {
            // Starving the other lanes; hand the green to the next-best
            // distinct lane. With four fixed lanes a distinct one always
            // exists, but the search stays total: fall back to the candidate.
            let next = order
                .iter()
                .filter_map(|&i| LaneId::from_index(i))
                .find(|lane| Some(*lane) != self.history.last)
                .unwrap_or(candidate);
            (next, SelectionReason::FairnessOverride)
        } else {
            (candidate, SelectionReason::ModelRushHour)
        };

        debug!(
            candidate = %candidate,
            chosen = %chosen,
            repeat_count = self.history.repeat_count,
            ?weighted,
            "lane selected"
        );

        self.history.last = Some(chosen);
        Ok((chosen, reason))
    }

    fn weight_and_normalize(&self, scores: [f64; LANE_COUNT], hour: u32) -> [f64; LANE_COUNT] {
        let mut weighted = scores;
        if self.is_rush_hour(hour) {
            for lane in &self.rush_hour.boosted_lanes {
                weighted[lane.index()] *= self.rush_hour.multiplier;
            }
        }
        let sum: f64 = weighted.iter().sum();
        for w in &mut weighted {
            *w /= sum + NORMALIZE_EPSILON;
        }
        weighted
    }

    fn is_rush_hour(&self, hour: u32) -> bool {
        self.rush_hour
            .windows
            .iter()
            .any(|&[start, end]| (start..=end).contains(&hour))
    }
}
