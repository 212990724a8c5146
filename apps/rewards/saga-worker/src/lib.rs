//! Reward Saga Worker
//!
//! Runs the reward-request saga: subscribes its handlers on Redis Pub/Sub
//! and keeps reward requests in MongoDB.
//!
//! ## Architecture
//!
//! ```text
//! Redis Pub/Sub (reward.requested | reward.processed | reward.failed)
//!   ↓
//! EventBus<RedisTransport>
//!   ↓ (one task per delivery)
//! RewardSaga handlers
//!   ↓
//! MongoDB (events, rewards, reward_requests)
//! ```
//!
//! Claims enter through [`RewardSaga::claim`], called by the HTTP gateway
//! that embeds `domain_rewards`; this worker only drives fulfillment.

mod config;

pub use config::Config;

use core_config::{Environment, FromEnv};
use database::common::RetryConfig;
use domain_rewards::{MongoRewardStore, RewardSaga, RewardStores};
use eyre::{Result, WrapErr};
use messaging::{EventBus, RedisTransport};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Run the saga worker until SIGINT or SIGTERM.
///
/// # Errors
///
/// Returns an error if configuration is invalid, a store cannot be reached
/// after retrying, the bus fails to start, or the Redis subscription is lost.
pub async fn run() -> Result<()> {
    core_config::tracing::install_color_eyre();
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    info!(
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        "Starting reward saga worker"
    );
    info!("Environment: {:?}", environment);

    let config = Config::from_env().wrap_err("Failed to load configuration")?;

    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .wrap_err("Failed to install Prometheus exporter")?;
    info!(port = config.metrics_port, "Prometheus metrics listening");

    // MongoDB
    info!("Connecting to MongoDB...");
    let mongo = database::mongodb::connect_from_config_with_retry(
        &config.mongo,
        Some(RetryConfig::startup()),
    )
    .await
    .wrap_err("Failed to connect to MongoDB")?;
    database::mongodb::check_health(&mongo)
        .await
        .wrap_err("MongoDB health check failed")?;
    info!(database = config.mongo.database(), "Connected to MongoDB");

    let store = Arc::new(MongoRewardStore::new(
        &mongo.database(config.mongo.database()),
    ));
    store
        .create_indexes()
        .await
        .wrap_err("Failed to create reward indexes")?;

    // Redis: a managed connection for PUBLISH, a client for the pub/sub connection
    info!("Connecting to Redis...");
    let mut publisher = database::redis::connect_from_config_with_retry(
        &config.redis,
        Some(RetryConfig::startup()),
    )
    .await
    .wrap_err("Failed to connect to Redis")?;
    database::redis::check_health(&mut publisher)
        .await
        .wrap_err("Redis health check failed")?;
    let subscriber = database::redis::open_client(&config.redis)
        .wrap_err("Failed to create Redis pub/sub client")?;
    info!("Connected to Redis");

    let transport = RedisTransport::new(subscriber, publisher);
    let bus = EventBus::start(Arc::new(transport))
        .await
        .wrap_err("Failed to start event bus")?;

    let saga = RewardSaga::start(RewardStores::from_store(store), bus.clone())
        .await
        .wrap_err("Failed to start reward saga")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
        }
        let _ = shutdown_tx.send(true);
    });

    info!("Reward saga worker running");
    serve(&saga, &bus, shutdown_rx).await?;

    info!("Reward saga worker stopped");
    Ok(())
}

/// Keep the saga running until shutdown is requested or the bus loses its
/// transport stream, then tear both down.
///
/// A lost stream is returned as an error so the process exits non-zero and
/// gets restarted.
async fn serve(
    saga: &RewardSaga,
    bus: &EventBus,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let disconnected = tokio::select! {
        changed = shutdown_rx.changed() => {
            if changed.is_err() {
                warn!("Shutdown channel closed unexpectedly");
            }
            false
        }
        _ = bus.disconnected() => {
            error!("Event bus lost its transport stream, stopping worker");
            true
        }
    };

    saga.shutdown().await;
    bus.shutdown().await.wrap_err("Failed to shut down event bus")?;

    if disconnected {
        return Err(eyre::eyre!("Event bus stopped delivering events"));
    }
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .wrap_err("Failed to install Ctrl+C handler")
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .wrap_err("Failed to install signal handler")?
            .recv()
            .await;
        Ok::<(), eyre::Report>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            info!("Received Ctrl+C, initiating shutdown...");
        },
        result = terminate => {
            result?;
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_rewards::InMemoryRewardStore;
    use messaging::InMemoryTransport;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn start() -> (RewardSaga, EventBus, InMemoryTransport) {
        let transport = InMemoryTransport::new();
        let bus = EventBus::start(Arc::new(transport.clone())).await.unwrap();
        let stores = RewardStores::from_store(Arc::new(InMemoryRewardStore::new()));
        let saga = RewardSaga::start(stores, bus.clone()).await.unwrap();
        (saga, bus, transport)
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown_signal() {
        let (saga, bus, transport) = start().await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();

        timeout(Duration::from_secs(2), serve(&saga, &bus, shutdown_rx))
            .await
            .unwrap()
            .unwrap();

        assert!(bus.is_closed());
        assert!(!transport.is_subscribed("reward.requested"));
    }

    #[tokio::test]
    async fn test_serve_fails_when_stream_is_lost() {
        let (saga, bus, transport) = start().await;
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        transport.disconnect();

        let err = timeout(Duration::from_secs(2), serve(&saga, &bus, shutdown_rx))
            .await
            .expect("worker kept running without a transport stream")
            .unwrap_err();

        assert_eq!(err.to_string(), "Event bus stopped delivering events");
        assert!(bus.is_closed());
    }
}
