// src/cycle.rs
//
// The top-level decision loop. One cycle: honor the inter-decision cooldown,
// smooth + threshold a fresh sensor snapshot, pick lane and green time,
// publish the decision, drive the lights, count the green down one second at
// a time, then flip the lane back to red and update stats. Publication order
// within a cycle is part of the dashboard contract. The only suspension
// points are the cooldown wait and the countdown, both interruptible by the
// shutdown signal; on shutdown or a fatal model error every lane goes red
// before the loop exits.

use crate::bus::EgressSender;
use crate::green_time::{pick_green_time, GreenTimeBounds};
use crate::presence::PresenceTracker;
use crate::scoring::{GreenTimeEstimator, LaneScorer};
use crate::selector::LaneSelector;
use crate::smoother::PresenceSmoother;
use crate::stats::StatsAggregator;
use crate::types::{Config, Decision, LaneId, LightState};
use anyhow::Result;
use chrono::Timelike;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Selecting,
    Active { lane: LaneId, remaining: u32 },
    Cooldown,
    ShuttingDown,
}

pub struct CycleDriver<S, E> {
    presence: Arc<PresenceTracker>,
    smoother: PresenceSmoother,
    selector: LaneSelector,
    stats: StatsAggregator,
    scorer: S,
    estimator: E,
    egress: EgressSender,
    shutdown: watch::Receiver<bool>,
    bounds: GreenTimeBounds,
    decision_cooldown: Duration,
    state: CycleState,
    last_decision: Option<Instant>,
    hour_source: fn() -> u32,
}

fn local_hour() -> u32 {
    chrono::Local::now().hour()
}

impl<S: LaneScorer, E: GreenTimeEstimator> CycleDriver<S, E> {
    pub fn new(
        config: &Config,
        presence: Arc<PresenceTracker>,
        scorer: S,
        estimator: E,
        egress: EgressSender,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            presence,
            smoother: PresenceSmoother::new(config.controller.alpha),
            selector: LaneSelector::new(
                config.controller.max_same_lane,
                config.rush_hour.clone(),
            ),
            stats: StatsAggregator::new(config.stats.manual_avg_wait),
            scorer,
            estimator,
            egress,
            shutdown,
            bounds: GreenTimeBounds {
                min_green: config.controller.min_green,
                max_green: config.controller.max_green,
            },
            decision_cooldown: Duration::from_secs_f64(config.controller.decision_cooldown_secs),
            state: CycleState::Idle,
            last_decision: None,
            hour_source: local_hour,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Run cycles until the shutdown signal fires or a model call fails.
    /// Either way the loop leaves every lane red with no active countdown.
    pub async fn run(&mut self) -> Result<()> {
        info!("✅ Traffic optimizer loop running");

        loop {
            if self.shutdown_requested() {
                break;
            }
            self.state = CycleState::Selecting;

            if let Some(last) = self.last_decision {
                let elapsed = last.elapsed();
                if elapsed < self.decision_cooldown
                    && self.wait_or_shutdown(self.decision_cooldown - elapsed).await
                {
                    break;
                }
            }

            // One smoothing tick and one thresholding per decision, on a
            // snapshot taken after the cooldown so the decision never acts on
            // a reading older than the wait.
            let raw = self.presence.snapshot();
            self.smoother.tick(&raw);
            let presence = self.smoother.thresholded();

            let hour = (self.hour_source)();
            let emergency = self.presence.emergency();

            let (lane, reason) =
                match self.selector.select(&presence, hour, emergency, &self.scorer) {
                    Ok(selection) => selection,
                    Err(e) => return self.halt_on_error(e),
                };
            let green_time = match pick_green_time(&presence, &self.estimator, self.bounds) {
                Ok(green) => green,
                Err(e) => return self.halt_on_error(e),
            };
            self.last_decision = Some(Instant::now());

            // Contract order: decision record, lane states, current lane,
            // then the countdown.
            self.egress.send_decision(Decision {
                lane,
                green_time,
                presence,
                reason,
            });
            for other in LaneId::ALL {
                let state = if other == lane {
                    LightState::Green
                } else {
                    LightState::Red
                };
                self.egress.send_lane_state(other, state);
            }
            self.egress.send_current(Some(lane));

            info!(
                lane = %lane,
                green_time,
                reason = reason.as_str(),
                ir = ?presence,
                "🚦 lane green"
            );

            let mut interrupted = false;
            for remaining in (1..=green_time).rev() {
                self.state = CycleState::Active { lane, remaining };
                self.egress.send_timer(remaining);
                if self.wait_or_shutdown(Duration::from_secs(1)).await {
                    interrupted = true;
                    break;
                }
            }
            if interrupted {
                break;
            }

            self.state = CycleState::Cooldown;
            self.egress.send_lane_state(lane, LightState::Red);
            let snapshot = self.stats.record(&presence, green_time);
            self.egress.send_stats(snapshot);
            info!(
                "Cycle {} complete: served_total={}, avg_wait={:.2}",
                snapshot.cycles, snapshot.served_total, snapshot.avg_wait
            );
        }

        self.all_red();
        self.state = CycleState::ShuttingDown;
        info!("👋 Stopped cleanly, all lanes red");
        Ok(())
    }

    fn halt_on_error(&mut self, e: anyhow::Error) -> Result<()> {
        error!("fatal model error, forcing all lanes red: {e:#}");
        self.all_red();
        self.state = CycleState::ShuttingDown;
        Err(e)
    }

    /// All lanes red, no current lane, countdown cleared. The only
    /// acceptable final state.
    fn all_red(&self) {
        for lane in LaneId::ALL {
            self.egress.send_lane_state(lane, LightState::Red);
        }
        self.egress.send_current(None);
        self.egress.send_timer(0);
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleep, but wake early on shutdown. Returns true when shutdown fired.
    async fn wait_or_shutdown(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = sleep(duration) => false,
            changed = self.shutdown.changed() => {
                changed.is_err() || *self.shutdown.borrow()
            }
        }
    }
}
