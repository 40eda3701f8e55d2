// src/stats.rs

use crate::types::PresenceVector;
use serde::Serialize;

/// Process-lifetime counters, updated once per completed cycle.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    cycles: u64,
    served_total: u64,
    avg_wait: f64,
    manual_avg_wait: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub served_total: u64,
    pub avg_wait: f64,
}

impl StatsAggregator {
    /// `manual_avg_wait` pins the reported average wait to a fixed value;
    /// otherwise it is the running mean of green times.
    pub fn new(manual_avg_wait: Option<f64>) -> Self {
        Self {
            manual_avg_wait,
            ..Self::default()
        }
    }

    /// Record one completed cycle. The presence sum is a served-vehicle
    /// proxy, not an exact count.
    pub fn record(&mut self, presence: &PresenceVector, green_time: u32) -> StatsSnapshot {
        self.cycles += 1;
        self.served_total += presence.iter().map(|&bit| u64::from(bit)).sum::<u64>();

        self.avg_wait = match self.manual_avg_wait {
            Some(value) => value,
            None if self.cycles == 1 => f64::from(green_time),
            None => {
                let n = self.cycles as f64;
                (self.avg_wait * (n - 1.0) + f64::from(green_time)) / n
            }
        };

        self.snapshot()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles,
            served_total: self.served_total,
            avg_wait: self.avg_wait,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_mean_over_five_cycles() {
        let mut stats = StatsAggregator::new(None);
        let mut last = stats.snapshot();
        for green in [10, 12, 8, 15, 10] {
            last = stats.record(&[1, 0, 0, 0], green);
        }
        assert_eq!(last.cycles, 5);
        assert!((last.avg_wait - 11.0).abs() < 1e-9);
    }

    #[test]
    fn avg_wait_equals_mean_of_green_times() {
        let greens = [7u32, 40, 13, 21, 9, 30, 7];
        let mut stats = StatsAggregator::new(None);
        let mut last = stats.snapshot();
        for green in greens {
            last = stats.record(&[0, 1, 1, 0], green);
        }
        let mean = greens.iter().map(|&g| f64::from(g)).sum::<f64>() / greens.len() as f64;
        assert!((last.avg_wait - mean).abs() < 1e-9);
    }

    #[test]
    fn served_total_sums_presence() {
        let mut stats = StatsAggregator::new(None);
        stats.record(&[1, 1, 0, 0], 10);
        let last = stats.record(&[0, 0, 0, 0], 10);
        assert_eq!(last.served_total, 2);
        assert_eq!(last.cycles, 2);
    }

    #[test]
    fn manual_override_pins_avg_wait() {
        let mut stats = StatsAggregator::new(Some(15.0));
        for green in [10, 40, 7] {
            let snap = stats.record(&[1, 1, 1, 1], green);
            assert!((snap.avg_wait - 15.0).abs() < 1e-9);
        }
    }
}
