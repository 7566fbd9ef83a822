//! collabd - server-mediated CRDT storage engine with presence and room
//! fan-out.
//!
//! Owns one actor per collaboration room (§4.5), multiplexed by a session
//! manager (§4.6) behind a WebSocket gateway (§6).

mod config;
mod durability;
mod envelope;
mod error;
mod gateway;
mod http;
mod metrics;
mod presence;
mod room;
mod session;

use crate::config::Config;
use crate::durability::noop::NoOpDurability;
use crate::durability::redb::RedbDurability;
use crate::durability::DurabilityHook;
use crate::session::SessionManager;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// Resolve the configuration path from CLI arguments.
/// Supports `-c <path>`, `--config <path>`, or a bare path.
/// Falls back to `config.toml` when no argument is provided.
fn resolve_config_path() -> String {
    let mut args = std::env::args().skip(1);

    let raw_path = match args.next() {
        Some(flag) if flag == "-c" || flag == "--config" => args.next().unwrap_or_else(|| {
            eprintln!("Missing path after {}", flag);
            std::process::exit(1);
        }),
        Some(path) => path,
        None => "config.toml".to_string(),
    };

    match std::fs::canonicalize(Path::new(&raw_path)) {
        Ok(p) => p.to_string_lossy().into_owned(),
        Err(_) => raw_path,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = resolve_config_path();

    let config = Config::load(&config_path).map_err(|e| {
        eprintln!("ERROR: Failed to load config from {}: {}", config_path, e);
        e
    })?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match config.server.log_format {
        crate::config::LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .json()
                .init();
        }
        crate::config::LogFormat::Pretty => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .init();
        }
    }

    info!(
        listen = %config.listen.address,
        room_path_prefix = %config.listen.room_path_prefix,
        "Starting collabd"
    );

    // Durability hook (spec §6 external interfaces). "none" is a valid,
    // deliberate choice for ephemeral deployments and tests — rooms simply
    // never persist and start fresh on every restart (spec §7's
    // DurabilityFailure policy: the room continues to serve live traffic
    // regardless of the backend).
    let durability: Arc<dyn DurabilityHook> = match config.durability.backend.as_str() {
        "redb" => {
            info!(path = %config.durability.path, "initializing redb durability backend");
            Arc::new(RedbDurability::new(&config.durability.path)?)
        }
        other => {
            if other != "none" {
                tracing::warn!(backend = other, "unknown durability backend, using no-op");
            }
            info!("durability disabled, rooms are in-memory only");
            Arc::new(NoOpDurability)
        }
    };

    let sessions = Arc::new(SessionManager::new(config.rooms.clone(), durability));

    // Prometheus metrics are optional. Convention: metrics_port = 0 disables
    // the HTTP endpoint (used by tests).
    if config.server.metrics_port == 0 {
        info!("Metrics disabled");
    } else {
        metrics::init();
        let metrics_port = config.server.metrics_port;
        tokio::spawn(async move {
            http::run_http_server(metrics_port).await;
        });
        info!(port = config.server.metrics_port, "Prometheus HTTP server started");
    }

    // Graceful shutdown: on SIGINT/SIGTERM, flush every live room's
    // durability hook before the process exits (SPEC_FULL §11).
    let shutdown_signal = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT - initiating graceful shutdown"),
            _ = sigterm.recv() => info!("Received SIGTERM - initiating graceful shutdown"),
        }
    };

    tokio::select! {
        result = gateway::run(config.listen.address, &config.listen.room_path_prefix, Arc::clone(&sessions)) => {
            if let Err(e) = result {
                error!(error = %e, "gateway exited with error");
            }
        }
        _ = shutdown_signal => {
            sessions.shutdown_all().await;
            info!("all rooms flushed, exiting");
        }
    }

    Ok(())
}
