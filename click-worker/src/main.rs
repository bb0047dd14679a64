// ============================================================================
// Click Worker - shortlink click events → analytics
// ============================================================================
//
// Reads click events from the `shortlink:click` Redis stream through the
// `shortlink:click:group` consumer group and writes one "eventRecord" row
// per event.
//
// Flow:
// 1. Load config from env (.env supported)
// 2. Connect Redis (one ConnectionManager shared by broker and counters)
// 3. Connect Postgres
// 4. Start the consumer named by CONSUMER_NAME
// 5. Run until SIGTERM / Ctrl-C, then stop the loop and exit
//
// Guarantees:
// - At-least-once delivery; a batch that keeps failing is retried up to
//   REDIS_STREAMS_MAX_RETRIES times, then moved to shortlink:click:dlq
// - An unknown CONSUMER_NAME aborts startup
//
// ============================================================================

use anyhow::{Context, Result};
use clickstream_config::{Config, SHORTLINK_CLICK_STREAM};
use clickstream_redis::RedisClient;
use clickstream_shared::analytics::{ClickEventHandler, PostgresEventRecordStore};
use clickstream_shared::db::create_pool;
use clickstream_shared::metrics;
use clickstream_shared::stream_consumer::{
    CLICK_CONSUMER, ConsumerRegistration, ConsumerSupervisor, RedisCounterStore,
    RedisStreamBroker,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.rust_log.clone()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("=== Click Worker Starting ===");
    info!("Consumer: {} (id: {})", config.consumer_name, config.consumer_id);
    info!(
        "Streams: max_retries={}, read_count={}, block_ms={}",
        config.streams.max_retries, config.streams.read_count, config.streams.block_ms
    );

    info!("Connecting to Redis at: {}", config.redis_url_safe());
    let redis = RedisClient::connect(&config.redis_url)
        .await
        .context("Failed to connect to Redis")?;
    info!("Connected to Redis");

    let pool = create_pool(&config.database_url, &config.db).await?;
    info!("Connected to Postgres");

    let mut supervisor = ConsumerSupervisor::new(
        Arc::new(RedisStreamBroker::new(redis.clone())),
        Arc::new(RedisCounterStore::new(redis)),
        config.streams.clone(),
        config.consumer_id.clone(),
    );
    supervisor.register(
        CLICK_CONSUMER,
        ConsumerRegistration::click_events(Arc::new(ClickEventHandler::new(
            Arc::new(PostgresEventRecordStore::new(pool.clone())),
            SHORTLINK_CLICK_STREAM,
        ))),
    );

    if let Err(e) = supervisor.initialize(&config.consumer_name).await {
        e.log();
        return Err(e).with_context(|| format!("Failed to start consumer {}", config.consumer_name));
    }

    shutdown_signal().await?;

    // The loop exits after its in-flight read returns (at most block_ms)
    let timeout = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(timeout, supervisor.stop_all()).await.is_err() {
        warn!(
            timeout_secs = config.shutdown_timeout_secs,
            "Consumer did not stop in time, exiting anyway"
        );
    }

    let summary = metrics::stream_summary(SHORTLINK_CLICK_STREAM);
    info!(
        acked = summary.acked,
        dead_lettered = summary.dead_lettered,
        errors = summary.errors,
        "Consumer summary"
    );
    match metrics::gather_metrics() {
        Ok(exposition) => debug!("Final metrics:\n{}", exposition),
        Err(e) => warn!(error = %e, "Failed to gather metrics"),
    }

    pool.close().await;
    info!("=== Click Worker Stopped ===");
    Ok(())
}

/// Resolve on SIGTERM or Ctrl-C
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown...");
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "Failed to listen for Ctrl-C");
                }
                info!("SIGINT received, initiating graceful shutdown...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        info!("Ctrl-C received, initiating graceful shutdown...");
    }
    Ok(())
}
