// src/smoother.rs

use crate::types::{PresenceVector, LANE_COUNT};

/// A smoothed level at or above this counts as "present" when building the
/// vector consumed by selection.
pub const PRESENT_THRESHOLD: f64 = 0.5;

/// Per-lane exponential moving average over the raw binary readings.
/// Suppresses the rapid 0/1 edge toggling a fast-publishing sensor produces.
///
/// `level[i] = alpha * raw[i] + (1 - alpha) * level[i]`
///
/// Levels start at zero and are never persisted across restarts.
pub struct PresenceSmoother {
    levels: [f64; LANE_COUNT],
    alpha: f64,
}

impl PresenceSmoother {
    /// `alpha` must be in (0, 1]; validated at config load.
    pub fn new(alpha: f64) -> Self {
        Self {
            levels: [0.0; LANE_COUNT],
            alpha,
        }
    }

    /// Fold one raw reading into the running levels.
    pub fn tick(&mut self, raw: &PresenceVector) -> [f64; LANE_COUNT] {
        for (level, &bit) in self.levels.iter_mut().zip(raw.iter()) {
            *level = self.alpha * f64::from(bit) + (1.0 - self.alpha) * *level;
        }
        self.levels
    }

    /// Threshold the current levels into a binary vector. Computed once per
    /// decision, not once per raw update.
    pub fn thresholded(&self) -> PresenceVector {
        let mut out = [0u8; LANE_COUNT];
        for (bit, &level) in out.iter_mut().zip(self.levels.iter()) {
            *bit = u8::from(level >= PRESENT_THRESHOLD);
        }
        out
    }

    pub fn levels(&self) -> [f64; LANE_COUNT] {
        self.levels
    }
}
