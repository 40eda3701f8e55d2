// src/types.rs

use serde::{Deserialize, Serialize};
use std::fmt;

pub const LANE_COUNT: usize = 4;

/// Thresholded per-lane presence bits, one per lane, each 0 or 1.
pub type PresenceVector = [u8; LANE_COUNT];

/// One of the four fixed approaches to the intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LaneId {
    Lane1,
    Lane2,
    Lane3,
    Lane4,
}

impl LaneId {
    pub const ALL: [LaneId; LANE_COUNT] = [LaneId::Lane1, LaneId::Lane2, LaneId::Lane3, LaneId::Lane4];

    pub fn index(self) -> usize {
        match self {
            LaneId::Lane1 => 0,
            LaneId::Lane2 => 1,
            LaneId::Lane3 => 2,
            LaneId::Lane4 => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<LaneId> {
        LaneId::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LaneId::Lane1 => "Lane1",
            LaneId::Lane2 => "Lane2",
            LaneId::Lane3 => "Lane3",
            LaneId::Lane4 => "Lane4",
        }
    }

    /// Parse the wire form used on the emergency topic ("Lane1".."Lane4").
    pub fn parse(s: &str) -> Option<LaneId> {
        LaneId::ALL.iter().copied().find(|l| l.as_str() == s)
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightState {
    Green,
    Red,
}

impl LightState {
    pub fn as_str(self) -> &'static str {
        match self {
            LightState::Green => "GREEN",
            LightState::Red => "RED",
        }
    }
}

/// Why the selector picked the lane it did. Wire strings match the
/// dashboard contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SelectionReason {
    #[serde(rename = "emergency override")]
    EmergencyOverride,
    #[serde(rename = "fairness override")]
    FairnessOverride,
    #[serde(rename = "model+rushhour")]
    ModelRushHour,
}

impl SelectionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SelectionReason::EmergencyOverride => "emergency override",
            SelectionReason::FairnessOverride => "fairness override",
            SelectionReason::ModelRushHour => "model+rushhour",
        }
    }
}

/// One decision record, published once per cycle and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub lane: LaneId,
    pub green_time: u32,
    #[serde(rename = "ir")]
    pub presence: PresenceVector,
    pub reason: SelectionReason,
}

// ── Configuration ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub rush_hour: RushHourConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// EMA smoothing factor, must be in (0, 1].
    pub alpha: f64,
    pub min_green: u32,
    pub max_green: u32,
    /// Consecutive-repeat ceiling before the fairness override kicks in.
    pub max_same_lane: u32,
    /// Minimum seconds between decisions, guards against duplicate rapid
    /// decisions when the loop re-enters quickly.
    pub decision_cooldown_secs: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            alpha: 0.6,
            min_green: 7,
            max_green: 40,
            max_same_lane: 3,
            decision_cooldown_secs: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RushHourConfig {
    /// Inclusive [start, end] hour windows during which the boost applies.
    pub windows: Vec<[u32; 2]>,
    pub multiplier: f64,
    pub boosted_lanes: Vec<LaneId>,
}

impl Default for RushHourConfig {
    fn default() -> Self {
        Self {
            windows: vec![[8, 10], [17, 20]],
            multiplier: 1.2,
            boosted_lanes: vec![LaneId::Lane1, LaneId::Lane2],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// When set, reported avg_wait is pinned to this value instead of the
    /// running mean of green times.
    pub manual_avg_wait: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub keepalive_secs: u64,
    pub client_id: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            keepalive_secs: 60,
            client_id: "traffic-optimizer".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "traffic_optimizer=info".to_string(),
        }
    }
}
