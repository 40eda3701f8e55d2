// src/bus.rs
//
// Wire contract with the sensor network and the dashboard. The controller
// core never touches the MQTT client directly: the ingress task applies
// parsed sensor events to the shared PresenceTracker, and the cycle driver
// pushes typed outbound events through an egress channel that a forwarding
// task drains onto the broker. The FIFO channel preserves the per-cycle
// publication order the dashboard relies on.

use crate::presence::PresenceTracker;
use crate::stats::StatsSnapshot;
use crate::types::{Decision, LaneId, LightState, MqttConfig};
use anyhow::{Context, Result};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

pub const TOPIC_IR_PREFIX: &str = "traffic/ir";
pub const TOPIC_EMERGENCY: &str = "traffic/emergency";
pub const TOPIC_CURRENT: &str = "signal/current";
pub const TOPIC_TIMER: &str = "signal/timer";
pub const TOPIC_DECISION: &str = "decision/signal";
pub const TOPIC_STATS_CYCLES: &str = "stats/cycles";
pub const TOPIC_STATS_SERVED: &str = "stats/served_total";
pub const TOPIC_STATS_AVG_WAIT: &str = "stats/avg_wait";

/// Payload published on `signal/current` when no lane holds the green.
pub const CURRENT_NONE: &str = "—";

pub fn lane_state_topic(lane: LaneId) -> String {
    format!("signal/lane{}", lane.index() + 1)
}

fn ir_topic(lane_index: usize) -> String {
    format!("{}{}", TOPIC_IR_PREFIX, lane_index + 1)
}

// ── Inbound ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundEvent {
    Presence { lane_index: usize, value: u8 },
    Emergency(Option<LaneId>),
}

/// Parse one inbound message. Malformed payloads and unknown topics yield
/// `None` and the previous state is retained; nothing inbound is ever fatal.
pub fn parse_inbound(topic: &str, payload: &str) -> Option<InboundEvent> {
    let payload = payload.trim();

    if let Some(suffix) = topic.strip_prefix(TOPIC_IR_PREFIX) {
        let lane: usize = suffix.parse().ok()?;
        if !(1..=4).contains(&lane) {
            return None;
        }
        let value: i64 = payload.parse().ok()?;
        return Some(InboundEvent::Presence {
            lane_index: lane - 1,
            value: value.clamp(0, 1) as u8,
        });
    }

    if topic == TOPIC_EMERGENCY {
        if payload.eq_ignore_ascii_case("off") {
            return Some(InboundEvent::Emergency(None));
        }
        return LaneId::parse(payload).map(|lane| InboundEvent::Emergency(Some(lane)));
    }

    None
}

// ── Outbound ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    Decision(Decision),
    LaneState { lane: LaneId, state: LightState },
    CurrentLane(Option<LaneId>),
    Timer(u32),
    Stats(StatsSnapshot),
}

/// Map an outbound event to the (topic, payload) pairs it puts on the wire.
pub fn wire_payloads(event: &OutboundEvent) -> Result<Vec<(String, String)>> {
    let pairs = match event {
        OutboundEvent::Decision(decision) => vec![(
            TOPIC_DECISION.to_string(),
            serde_json::to_string(decision).context("Failed to encode decision record")?,
        )],
        OutboundEvent::LaneState { lane, state } => {
            vec![(lane_state_topic(*lane), state.as_str().to_string())]
        }
        OutboundEvent::CurrentLane(lane) => vec![(
            TOPIC_CURRENT.to_string(),
            lane.map_or_else(|| CURRENT_NONE.to_string(), |l| l.as_str().to_string()),
        )],
        OutboundEvent::Timer(secs) => vec![(TOPIC_TIMER.to_string(), secs.to_string())],
        OutboundEvent::Stats(snapshot) => vec![
            (TOPIC_STATS_CYCLES.to_string(), snapshot.cycles.to_string()),
            (
                TOPIC_STATS_SERVED.to_string(),
                snapshot.served_total.to_string(),
            ),
            (
                TOPIC_STATS_AVG_WAIT.to_string(),
                format!("{:.2}", snapshot.avg_wait),
            ),
        ],
    };
    Ok(pairs)
}

/// Cheap cloneable handle the cycle driver publishes through. Dropping every
/// sender lets the egress task drain and exit.
#[derive(Clone)]
pub struct EgressSender {
    tx: mpsc::UnboundedSender<OutboundEvent>,
}

impl EgressSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send_decision(&self, decision: Decision) {
        self.send(OutboundEvent::Decision(decision));
    }

    pub fn send_lane_state(&self, lane: LaneId, state: LightState) {
        self.send(OutboundEvent::LaneState { lane, state });
    }

    pub fn send_current(&self, lane: Option<LaneId>) {
        self.send(OutboundEvent::CurrentLane(lane));
    }

    pub fn send_timer(&self, secs: u32) {
        self.send(OutboundEvent::Timer(secs));
    }

    pub fn send_stats(&self, snapshot: StatsSnapshot) {
        self.send(OutboundEvent::Stats(snapshot));
    }

    fn send(&self, event: OutboundEvent) {
        if self.tx.send(event).is_err() {
            debug!("egress channel closed, dropping event");
        }
    }
}

// ── MQTT transport ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct MqttLink {
    client: AsyncClient,
}

impl MqttLink {
    pub fn connect(config: &MqttConfig) -> (Self, EventLoop) {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keepalive_secs));
        let (client, eventloop) = AsyncClient::new(options, 64);
        (Self { client }, eventloop)
    }

    pub async fn subscribe_inputs(&self) -> Result<()> {
        for lane_index in 0..4 {
            self.client
                .subscribe(ir_topic(lane_index), QoS::AtMostOnce)
                .await
                .context("Failed to subscribe to presence topic")?;
        }
        self.client
            .subscribe(TOPIC_EMERGENCY, QoS::AtMostOnce)
            .await
            .context("Failed to subscribe to emergency topic")?;
        Ok(())
    }

    pub async fn publish(&self, event: &OutboundEvent) -> Result<()> {
        for (topic, payload) in wire_payloads(event)? {
            self.client
                .publish(topic, QoS::AtMostOnce, false, payload)
                .await
                .context("Failed to publish to broker")?;
        }
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.client.disconnect().await?;
        Ok(())
    }
}

/// Apply one broker packet. Sensor and emergency publishes update the shared
/// tracker; every ConnAck re-issues the input subscriptions, because the
/// broker forgets a clean-session client's subscriptions on reconnect and
/// rumqttc does not replay SUBSCRIBEs on its own.
async fn handle_incoming(link: &MqttLink, tracker: &PresenceTracker, packet: Incoming) {
    match packet {
        Incoming::ConnAck(_) => {
            info!("connected to MQTT broker, subscribing to sensor topics");
            if let Err(e) = link.subscribe_inputs().await {
                warn!("failed to subscribe to sensor topics: {e:#}");
            }
        }
        Incoming::Publish(publish) => {
            let payload = String::from_utf8_lossy(&publish.payload);
            match parse_inbound(&publish.topic, &payload) {
                Some(InboundEvent::Presence { lane_index, value }) => {
                    tracker.update(lane_index, value);
                    debug!(lane_index, value, "presence updated");
                }
                Some(InboundEvent::Emergency(lane)) => {
                    tracker.set_emergency(lane);
                    match lane {
                        Some(lane) => warn!(lane = %lane, "emergency override set"),
                        None => info!("emergency override cleared"),
                    }
                }
                None => {
                    debug!(topic = %publish.topic, %payload, "ignoring malformed message");
                }
            }
        }
        _ => {}
    }
}

/// Poll the broker connection, applying sensor and emergency messages to the
/// shared tracker. Connection errors are logged and retried; the decision
/// loop keeps running on last-known values.
pub async fn run_ingress(
    link: MqttLink,
    mut eventloop: EventLoop,
    tracker: Arc<PresenceTracker>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(packet)) => {
                    handle_incoming(&link, &tracker, packet).await;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("MQTT connection error: {e}; retrying in 1s");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
    debug!("ingress task stopped");
}

/// Forward outbound events to the broker until every sender is dropped.
pub async fn run_egress(link: MqttLink, mut rx: mpsc::UnboundedReceiver<OutboundEvent>) {
    while let Some(event) = rx.recv().await {
        if let Err(e) = link.publish(&event).await {
            warn!("failed to publish {event:?}: {e}");
        }
    }
    debug!("egress task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SelectionReason;
    use rumqttc::{ConnAck, ConnectReturnCode, Publish};

    #[test]
    fn parses_presence_topics() {
        assert_eq!(
            parse_inbound("traffic/ir1", "1"),
            Some(InboundEvent::Presence { lane_index: 0, value: 1 })
        );
        assert_eq!(
            parse_inbound("traffic/ir4", " 0 "),
            Some(InboundEvent::Presence { lane_index: 3, value: 0 })
        );
        // out-of-range integers clamp to the binary domain
        assert_eq!(
            parse_inbound("traffic/ir2", "9"),
            Some(InboundEvent::Presence { lane_index: 1, value: 1 })
        );
        assert_eq!(
            parse_inbound("traffic/ir2", "-3"),
            Some(InboundEvent::Presence { lane_index: 1, value: 0 })
        );
    }

    #[test]
    fn malformed_presence_is_ignored() {
        assert_eq!(parse_inbound("traffic/ir1", "on"), None);
        assert_eq!(parse_inbound("traffic/ir1", ""), None);
        assert_eq!(parse_inbound("traffic/ir5", "1"), None);
        assert_eq!(parse_inbound("traffic/irX", "1"), None);
        assert_eq!(parse_inbound("signal/lane1", "GREEN"), None);
    }

    #[test]
    fn parses_emergency_payloads() {
        assert_eq!(
            parse_inbound("traffic/emergency", "Lane3"),
            Some(InboundEvent::Emergency(Some(LaneId::Lane3)))
        );
        assert_eq!(
            parse_inbound("traffic/emergency", "off"),
            Some(InboundEvent::Emergency(None))
        );
        assert_eq!(
            parse_inbound("traffic/emergency", "OFF"),
            Some(InboundEvent::Emergency(None))
        );
        assert_eq!(parse_inbound("traffic/emergency", "Lane9"), None);
        assert_eq!(parse_inbound("traffic/emergency", "ambulance"), None);
    }

    #[test]
    fn decision_goes_out_as_json() {
        let event = OutboundEvent::Decision(Decision {
            lane: LaneId::Lane2,
            green_time: 14,
            presence: [0, 1, 0, 1],
            reason: SelectionReason::FairnessOverride,
        });
        let pairs = wire_payloads(&event).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, TOPIC_DECISION);
        assert_eq!(
            pairs[0].1,
            r#"{"lane":"Lane2","green_time":14,"ir":[0,1,0,1],"reason":"fairness override"}"#
        );
    }

    #[test]
    fn lane_and_current_wire_forms() {
        let pairs = wire_payloads(&OutboundEvent::LaneState {
            lane: LaneId::Lane3,
            state: LightState::Green,
        })
        .unwrap();
        assert_eq!(pairs, vec![("signal/lane3".to_string(), "GREEN".to_string())]);

        let pairs = wire_payloads(&OutboundEvent::CurrentLane(Some(LaneId::Lane1))).unwrap();
        assert_eq!(pairs[0].1, "Lane1");
        let pairs = wire_payloads(&OutboundEvent::CurrentLane(None)).unwrap();
        assert_eq!(pairs[0].1, CURRENT_NONE);
    }

    #[tokio::test]
    async fn publish_packets_update_the_tracker() {
        let (link, _eventloop) = MqttLink::connect(&MqttConfig::default());
        let tracker = PresenceTracker::new();

        handle_incoming(
            &link,
            &tracker,
            Incoming::Publish(Publish::new("traffic/ir2", QoS::AtMostOnce, "1")),
        )
        .await;
        handle_incoming(
            &link,
            &tracker,
            Incoming::Publish(Publish::new("traffic/emergency", QoS::AtMostOnce, "Lane4")),
        )
        .await;

        assert_eq!(tracker.snapshot(), [0, 1, 0, 0]);
        assert_eq!(tracker.emergency(), Some(LaneId::Lane4));
    }

    #[tokio::test]
    async fn every_connack_requeues_the_input_subscriptions() {
        // A clean-session reconnect starts with no subscriptions on the
        // broker, so the second ConnAck must queue the SUBSCRIBEs again just
        // like the first.
        let (link, eventloop) = MqttLink::connect(&MqttConfig::default());
        let tracker = PresenceTracker::new();
        let ack = || {
            Incoming::ConnAck(ConnAck {
                session_present: false,
                code: ConnectReturnCode::Success,
            })
        };

        handle_incoming(&link, &tracker, ack()).await;
        handle_incoming(&link, &tracker, ack()).await;

        // With the event loop gone the request queue is closed, so the
        // re-subscribe path surfaces a failure instead of silently skipping.
        drop(eventloop);
        assert!(link.subscribe_inputs().await.is_err());
    }

    #[test]
    fn stats_publish_three_topics_with_two_decimal_wait() {
        let pairs = wire_payloads(&OutboundEvent::Stats(StatsSnapshot {
            cycles: 3,
            served_total: 7,
            avg_wait: 11.5,
        }))
        .unwrap();
        assert_eq!(
            pairs,
            vec![
                (TOPIC_STATS_CYCLES.to_string(), "3".to_string()),
                (TOPIC_STATS_SERVED.to_string(), "7".to_string()),
                (TOPIC_STATS_AVG_WAIT.to_string(), "11.50".to_string()),
            ]
        );
    }
}
