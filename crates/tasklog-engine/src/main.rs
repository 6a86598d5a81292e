//! Tasklog live feed binary.
//!
//! Wires the snapshot pipeline to `PostgreSQL`, runs the snapshot and
//! heartbeat timers, and serves the observer `WebSocket` feed until
//! Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `tasklog-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Connect to the operational and history databases
//! 4. Run history-store migrations
//! 5. Build the snapshot and ping hubs
//! 6. Start the observer server
//! 7. Spawn the snapshot and heartbeat loops
//! 8. Wait for Ctrl-C, then stop everything and close the pools

mod error;
mod pg_source;

use std::sync::Arc;

use tasklog_core::config::LogFormat;
use tasklog_core::{
    Hub, Shutdown, SnapshotCycle, TasklogConfig, run_heartbeat_loop, run_snapshot_loop,
};
use tasklog_db::{PostgresConfig, PostgresPool};
use tasklog_observer::{AppState, ServerConfig, spawn_observer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::pg_source::{PgHistorySource, PgOperationalSource};

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, a database connection, or the
/// observer listener cannot be set up.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration. Logging is not up yet, so the "file not
    //    found" notice inside `load` is only visible on a later run.
    let config = TasklogConfig::load()?;

    // 2. Initialize structured logging.
    init_tracing(&config)?;
    info!("tasklog-engine starting");
    info!(
        snapshot_period_secs = config.schedule.snapshot_period_secs,
        heartbeat_period_secs = config.schedule.heartbeat_period_secs,
        subscriber_capacity = config.hub.subscriber_capacity,
        observer_port = config.infrastructure.observer_port,
        "Configuration loaded"
    );

    // 3. Connect to both databases.
    let infra = &config.infrastructure;
    let operational = PostgresPool::connect(
        &PostgresConfig::new("operational", &infra.operational_url)
            .with_max_connections(infra.max_connections),
    )
    .await?;
    let history = PostgresPool::connect(
        &PostgresConfig::new("history", &infra.history_url)
            .with_max_connections(infra.max_connections),
    )
    .await?;

    // 4. History schema.
    history.run_migrations().await?;

    // 5. Hubs and shared state.
    let shutdown = Arc::new(Shutdown::new());
    let capacity = config.hub.subscriber_capacity;
    let app_state = Arc::new(AppState::new(
        Hub::new("snapshots", capacity),
        Hub::new("pings", capacity),
        Arc::clone(&shutdown),
    ));

    // 6. Observer server.
    let server_config = ServerConfig {
        host: infra.observer_host.clone(),
        port: infra.observer_port,
    };
    let observer_handle = spawn_observer(&server_config, Arc::clone(&app_state)).await?;
    info!(port = server_config.port, "Observer server started");

    // 7. Timers.
    let cycle = SnapshotCycle::new(
        Arc::new(PgOperationalSource::new(operational.pool().clone())),
        Arc::new(PgHistorySource::new(history.pool().clone())),
        app_state.snapshots.clone(),
    );
    let snapshot_handle = tokio::spawn(run_snapshot_loop(
        cycle,
        config.schedule.snapshot_period(),
        Arc::clone(&shutdown),
    ));
    let heartbeat_handle = tokio::spawn(run_heartbeat_loop(
        app_state.pings.clone(),
        config.schedule.heartbeat_period(),
        Arc::clone(&shutdown),
    ));

    // 8. Run until Ctrl-C.
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C, shutting down");
    }
    info!("Shutdown requested");
    shutdown.trigger();

    let ticks = snapshot_handle.await.map_err(|e| EngineError::Task {
        name: "snapshot loop",
        message: e.to_string(),
    })?;
    let beats = heartbeat_handle.await.map_err(|e| EngineError::Task {
        name: "heartbeat loop",
        message: e.to_string(),
    })?;
    observer_handle.await.map_err(|e| EngineError::Task {
        name: "observer server",
        message: e.to_string(),
    })?;

    operational.close().await;
    history.close().await;

    info!(ticks, beats, "tasklog-engine shutdown complete");
    Ok(())
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `logging.level` when set.
fn init_tracing(config: &TasklogConfig) -> Result<(), EngineError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = match config.logging.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    result.map_err(|e| EngineError::Setup {
        message: format!("failed to install tracing subscriber: {e}"),
    })
}
