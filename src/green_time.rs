// src/green_time.rs

use crate::scoring::GreenTimeEstimator;
use crate::types::PresenceVector;
use anyhow::Result;

#[derive(Debug, Clone, Copy)]
pub struct GreenTimeBounds {
    pub min_green: u32,
    pub max_green: u32,
}

/// Turn a raw model estimate into a bounded green time.
///
/// The estimate is clamped into [min_green, max_green]. Three or more
/// occupied lanes earn a +5s demand bonus, re-clamped to the ceiling. Zero
/// total demand always yields exactly min_green.
pub fn pick_green_time(
    presence: &PresenceVector,
    estimator: &dyn GreenTimeEstimator,
    bounds: GreenTimeBounds,
) -> Result<u32> {
    let raw = estimator.estimate(presence)?;
    let total: u8 = presence.iter().sum();

    let mut green = raw.clamp(f64::from(bounds.min_green), f64::from(bounds.max_green)) as u32;
    if total >= 3 {
        green = bounds.max_green.min(green + 5);
    }
    if total == 0 {
        green = bounds.min_green;
    }
    Ok(green)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct FixedEstimate(f64);

    impl GreenTimeEstimator for FixedEstimate {
        fn estimate(&self, _presence: &PresenceVector) -> Result<f64> {
            Ok(self.0)
        }
    }

    struct FailingEstimate;

    impl GreenTimeEstimator for FailingEstimate {
        fn estimate(&self, _presence: &PresenceVector) -> Result<f64> {
            Err(anyhow!("model unavailable"))
        }
    }

    const BOUNDS: GreenTimeBounds = GreenTimeBounds {
        min_green: 7,
        max_green: 40,
    };

    #[test]
    fn empty_intersection_gets_exactly_min_green() {
        for estimate in [0.0, 7.0, 25.0, 99.0] {
            let green = pick_green_time(&[0, 0, 0, 0], &FixedEstimate(estimate), BOUNDS).unwrap();
            assert_eq!(green, 7);
        }
    }

    #[test]
    fn estimate_is_clamped_into_bounds() {
        let low = pick_green_time(&[1, 0, 0, 0], &FixedEstimate(2.0), BOUNDS).unwrap();
        assert_eq!(low, 7);
        let high = pick_green_time(&[1, 0, 0, 0], &FixedEstimate(120.0), BOUNDS).unwrap();
        assert_eq!(high, 40);
        let mid = pick_green_time(&[1, 1, 0, 0], &FixedEstimate(22.4), BOUNDS).unwrap();
        assert_eq!(mid, 22);
    }

    #[test]
    fn high_demand_adds_bonus() {
        let green = pick_green_time(&[1, 1, 1, 0], &FixedEstimate(20.0), BOUNDS).unwrap();
        assert_eq!(green, 25);
        let green = pick_green_time(&[1, 1, 1, 1], &FixedEstimate(2.0), BOUNDS).unwrap();
        assert_eq!(green, 12); // clamped to min first, then +5
    }

    #[test]
    fn bonus_never_exceeds_ceiling() {
        let green = pick_green_time(&[1, 1, 1, 1], &FixedEstimate(38.0), BOUNDS).unwrap();
        assert_eq!(green, 40);
        let green = pick_green_time(&[1, 1, 1, 1], &FixedEstimate(500.0), BOUNDS).unwrap();
        assert_eq!(green, 40);
    }

    #[test]
    fn output_always_within_bounds() {
        let vectors: [PresenceVector; 5] =
            [[0, 0, 0, 0], [1, 0, 0, 0], [1, 1, 0, 0], [1, 1, 1, 0], [1, 1, 1, 1]];
        for presence in vectors {
            for estimate in [-5.0, 0.0, 7.0, 23.5, 40.0, 80.0] {
                let green = pick_green_time(&presence, &FixedEstimate(estimate), BOUNDS).unwrap();
                assert!((7..=40).contains(&green), "{presence:?} / {estimate} -> {green}");
            }
        }
    }

    #[test]
    fn estimator_failure_propagates() {
        assert!(pick_green_time(&[1, 0, 0, 0], &FailingEstimate, BOUNDS).is_err());
    }
}
