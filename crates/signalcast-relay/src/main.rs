//! Relay binary for the Signalcast traffic telemetry stream.
//!
//! Wires the relay core to the dashboard server and runs until Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `signalcast-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Build the relay (state store, event log, hub, command queue)
//! 4. Spawn the broadcast loop
//! 5. Bind and spawn the dashboard server
//! 6. Spawn the demo producer, or drain commands if none is attached
//! 7. Wait for Ctrl-C, then cancel everything and disconnect dashboards

mod demo;
mod error;

use std::sync::Arc;
use std::time::Duration;

use signalcast_core::commands::CommandReceiver;
use signalcast_core::config::{LogFormat, LoggingConfig, RelayConfig};
use signalcast_core::metrics::SystemSampler;
use signalcast_core::relay::Relay;
use signalcast_observer::server::ServerConfig;
use signalcast_observer::startup::spawn_observer;
use signalcast_observer::state::AppState;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::RelayError;

/// Application entry point for the relay.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded, the dashboard
/// server cannot bind, or a background task panics.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = RelayConfig::load().map_err(RelayError::from)?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!("signalcast-relay starting");
    info!(
        host = config.server.host,
        port = config.server.port,
        tick_interval_ms = config.broadcast.tick_interval_ms,
        send_timeout_ms = config.hub.send_timeout_ms,
        demo = config.demo.enabled,
        "Configuration loaded"
    );

    // 3. Build the relay.
    let sampler = Arc::new(SystemSampler::from_config(&config.metrics));
    let server_config = ServerConfig::from(&config.server);
    let demo_config = config.demo.clone();
    let (relay, commands) = Relay::new(config);
    let shutdown = CancellationToken::new();

    // 4. Broadcast loop.
    let broadcast = tokio::spawn(relay.broadcast_loop(sampler).run(shutdown.clone()));

    // 5. Dashboard server.
    let observer = spawn_observer(
        &server_config,
        Arc::new(AppState::from_relay(&relay)),
        shutdown.clone(),
    )
    .await
    .map_err(RelayError::from)?;
    info!(addr = %observer.addr, "Dashboards can connect at ws://{}/ws", observer.addr);

    // 6. Producer side.
    let producer = if demo_config.enabled {
        tokio::spawn(demo::run(
            relay.producer(),
            commands,
            Duration::from_millis(demo_config.interval_ms),
            shutdown.clone(),
        ))
    } else {
        tokio::spawn(drain_commands(commands, shutdown.clone()))
    };

    // 7. Run until Ctrl-C.
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| RelayError::Signal {
            message: format!("{e}"),
        })?;
    info!("Shutdown requested");

    shutdown.cancel();
    relay.shutdown();

    for (name, task) in [
        ("broadcast", broadcast),
        ("dashboard server", observer.task),
        ("producer", producer),
    ] {
        task.await.map_err(|e| RelayError::Task {
            message: format!("{name}: {e}"),
        })?;
    }

    info!("signalcast-relay stopped");
    Ok(())
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured level.
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match config.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Consume commands when no producer is attached so the queue never
/// fills.
async fn drain_commands(mut commands: CommandReceiver, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            command = commands.recv() => {
                let Some(command) = command else { break };
                warn!(command = %command.kind, "No producer attached, command discarded");
            }
        }
    }
}
