/**
 * PV TWIN KERNEL - Point d'entrée de l'estimateur
 *
 * RÔLE : Bootstrap : .env, logs, config, client MQTT, boucle d'événements,
 * publication des diagnostics, puis dispatcher jusqu'à Ctrl-C / SIGTERM.
 */

use anyhow::{Context, Result};
use pvtwin_kernel::bus::{self, InboundMessage};
use pvtwin_kernel::config::load_config;
use pvtwin_kernel::{new_shared_store, DiagnosticsTracker, Dispatcher, TopicMap};
use std::time::Duration;
use tokio::signal;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = load_config().await.context("failed to load configuration")?;
    let client_id = cfg.client_id();
    log::info!(
        "[kernel] starting {} -> {}:{} (module voc0={} isc0={} vmp0={} imp0={})",
        client_id,
        cfg.mqtt.host,
        cfg.mqtt.port,
        cfg.module.voc0,
        cfg.module.isc0,
        cfg.module.vmp0,
        cfg.module.imp0
    );

    let topics = TopicMap::from_conf(&cfg.topics);
    let store = new_shared_store();
    let diagnostics = DiagnosticsTracker::new();

    let (mqtt, eventloop) = bus::connect(&cfg.mqtt, &client_id);
    let (tx, rx) = mpsc::channel::<InboundMessage>(100);
    let listener = bus::spawn_event_loop(eventloop, mqtt.clone(), topics.subscriptions(), diagnostics.clone(), tx);

    if let Some(topic) = cfg.diagnostics.topic.clone() {
        log::info!("[kernel] diagnostics every {}s on {}", cfg.diagnostics.interval_secs, topic);
        diagnostics.spawn_publisher(
            store.clone(),
            mqtt.clone(),
            topic,
            Duration::from_secs(cfg.diagnostics.interval_secs),
        );
    }

    let dispatcher = Dispatcher::new(store, topics, cfg.module.clone(), mqtt.clone(), diagnostics);

    tokio::select! {
        _ = dispatcher.run(rx) => {
            log::warn!("[kernel] dispatcher stopped");
        }
        _ = shutdown_signal() => {
            log::info!("[kernel] shutdown signal received");
        }
    }

    if let Err(e) = mqtt.client().disconnect().await {
        log::warn!("[kernel] MQTT disconnect failed: {e:?}");
    }
    listener.abort();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("[kernel] Ctrl+C handler failed: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("[kernel] SIGTERM handler failed: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! { _ = ctrl_c => {}, _ = terminate => {}, }
}
