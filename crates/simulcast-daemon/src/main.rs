mod checkout;
mod core;
mod http;
mod mpv;
mod proxy;
mod reconcile;
mod status;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use simulcast_proto::config::Config;
use simulcast_proto::player::PlayerEvent;
use simulcast_proto::state::StateManager;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::core::{DaemonCore, DaemonEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // File logging (data dir) + stderr
    let data_dir = simulcast_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,simulcast_daemon=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let state = Arc::new(StateManager::new());

    // Status proxy (always on — the poller is pointed here by default, and
    // it is the only place the upstream API key is used)
    let _proxy_handle = proxy::start_server(
        config.http.bind_address.clone(),
        config.proxy.port,
        config.proxy.clone(),
    );

    // Local HTTP API if enabled (view snapshots + tip hand-off)
    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            Arc::clone(&state),
            config.tips.clone(),
        );
    }

    // Event channel — all external inputs funnel into DaemonCore
    let (event_tx, event_rx) = mpsc::channel::<DaemonEvent>(256);

    // Playback component callbacks join the same ordered event stream
    let (player_tx, mut player_rx) = mpsc::channel::<PlayerEvent>(64);
    {
        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = player_rx.recv().await {
                if event_tx.send(DaemonEvent::Player(event)).await.is_err() {
                    break;
                }
            }
        });
    }

    // Status poller: first check immediately, then on the fixed cadence
    let poller = status::StatusPoller::new(config.status_poll_url());
    let _poll_handle = status::spawn(poller, config.status.poll_interval_ms, event_tx.clone());

    let daemon_core =
        DaemonCore::<mpv::MpvPlayer>::new(config.player.clone(), player_tx, Arc::clone(&state));

    info!("Daemon initialised, running event loop");
    daemon_core.run(event_rx).await?;

    Ok(())
}
