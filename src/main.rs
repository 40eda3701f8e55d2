// src/main.rs

mod bus;
mod config;
mod cycle;
mod green_time;
mod presence;
mod scoring;
mod selector;
mod smoother;
mod stats;
mod types;

use anyhow::Result;
use bus::{EgressSender, MqttLink};
use cycle::CycleDriver;
use presence::PresenceTracker;
use scoring::{DemandEstimator, DemandScorer};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use types::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load_or_default("config.yaml")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("🚦 Traffic optimizer starting");
    info!(
        "Green time bounds: [{}, {}]s, fairness ceiling: {}, alpha: {}",
        config.controller.min_green,
        config.controller.max_green,
        config.controller.max_same_lane,
        config.controller.alpha
    );

    let tracker = Arc::new(PresenceTracker::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (egress, egress_rx) = EgressSender::channel();

    let (link, eventloop) = MqttLink::connect(&config.mqtt);
    info!(
        "Connecting to MQTT broker at {}:{}",
        config.mqtt.host, config.mqtt.port
    );

    // The ingress task subscribes on every ConnAck, reconnects included.
    let ingress = tokio::spawn(bus::run_ingress(
        link.clone(),
        eventloop,
        tracker.clone(),
        shutdown_rx.clone(),
    ));
    let egress_task = tokio::spawn(bus::run_egress(link.clone(), egress_rx));

    tokio::spawn(async move {
        wait_for_termination().await;
        info!("termination signal received, shutting down");
        let _ = shutdown_tx.send(true);
    });

    let mut driver = CycleDriver::new(
        &config,
        tracker,
        DemandScorer,
        DemandEstimator::default(),
        egress,
        shutdown_rx,
    );

    let outcome = driver.run().await;
    if let Err(e) = &outcome {
        error!("decision loop stopped on error: {e:#}");
    }

    // Drop the driver so the egress channel closes and the forwarder can
    // drain the final all-red publishes before we disconnect.
    drop(driver);
    if let Err(e) = egress_task.await {
        warn!("egress task failed: {e}");
    }
    if let Err(e) = link.disconnect().await {
        warn!("MQTT disconnect failed: {e}");
    }
    ingress.abort();

    info!("👋 Stopped cleanly");
    outcome
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!("failed to install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}
