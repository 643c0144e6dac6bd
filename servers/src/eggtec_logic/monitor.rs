//! # Monitor Startup
//!
//! Wires the store, the error sink and the rollup service together, then
//! binds one socket server per configured channel and the REST API.

use anyhow::{Context, Result};
use lib_common::aggregation::AggregationQueryService;
use lib_common::channels::{ChannelDeps, ChannelServer};
use lib_common::connections::{PgExecutor, QueryExecutor};
use lib_common::loggers::{ErrorSink, LocalErrorLog, StoreErrorSink};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::api::{self, ApiState};
use super::config::MonitorConfig;
use super::socket;

/// A spawned server and the name it is logged under.
pub struct ServerTask {
    pub name: String,
    pub handle: JoinHandle<std::io::Result<()>>,
}

async fn bind(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))
}

/// Starts every channel server and the REST API on `executor`.
///
/// Each server stops when `shutdown` fires.
pub async fn start_with(
    config: &MonitorConfig,
    executor: Arc<dyn QueryExecutor>,
    shutdown: &broadcast::Sender<()>,
) -> Result<Vec<ServerTask>> {
    let sink: Arc<dyn ErrorSink> = Arc::new(StoreErrorSink::new(
        executor.clone(),
        LocalErrorLog::new(&config.error_log_dir),
    ));
    let deps = ChannelDeps {
        executor: executor.clone(),
        sink: sink.clone(),
        rollups: AggregationQueryService::new(executor.clone(), config.result_encoding),
        interval: config.interval,
    };

    let mut tasks = Vec::with_capacity(config.channels.len() + 1);
    for channel in config.channels.iter() {
        let listener = bind(channel.id).await?;
        let handle = ChannelServer::spawn(channel.clone(), deps.clone());
        tracing::info!("{} server running on http://localhost:{}", channel.label, channel.id);
        tasks.push(ServerTask {
            name: channel.origin(),
            handle: tokio::spawn(socket::serve(listener, handle, shutdown.subscribe())),
        });
    }

    let listener = bind(config.api_port).await?;
    let state = ApiState::new(executor, sink, &config.net_dir);
    tracing::info!("REST API running on http://localhost:{}", config.api_port);
    tasks.push(ServerTask {
        name: "REST API".to_string(),
        handle: tokio::spawn(api::serve(listener, state, shutdown.subscribe())),
    });

    Ok(tasks)
}

/// Creates the PostgreSQL pool from `config` and starts everything on it.
pub async fn start(config: &MonitorConfig, shutdown: &broadcast::Sender<()>) -> Result<Vec<ServerTask>> {
    let executor = PgExecutor::connect(&config.database_url, config.pool_max_size, config.pool_wait_timeout)
        .context("creating the database pool")?;
    start_with(config, Arc::new(executor), shutdown).await
}

/// Waits for every server to finish, logging the ones that failed.
pub async fn join_all(tasks: Vec<ServerTask>) {
    for task in tasks {
        match task.handle.await {
            Ok(Ok(())) => tracing::debug!("{} stopped", task.name),
            Ok(Err(e)) => tracing::error!("{} stopped with error: {}", task.name, e),
            Err(e) => tracing::error!("{} task panicked or was cancelled: {}", task.name, e),
        }
    }
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Ctrl-C received, initiating shutdown."),
        _ = terminate => tracing::info!("SIGTERM received, initiating shutdown."),
    }
}
