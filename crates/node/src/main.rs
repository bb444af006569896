//! Node entry point.

use std::sync::Arc;

use event_store::{InMemoryEventStore, PostgresEventStore};
use metrics_exporter_prometheus::PrometheusBuilder;
use node::{Config, LogFormat, Node, NodeError, Result};
use sqlx::postgres::PgPoolOptions;
use timer::{InMemoryReminderStore, PostgresReminderStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                tracing::info!("received SIGINT, starting graceful shutdown");
            }
            _ = terminate.recv() => {
                tracing::info!("received SIGTERM, starting graceful shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        tracing::info!("received SIGINT, starting graceful shutdown");
    }

    Ok(())
}

fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    }
    .map_err(|e| NodeError::Logging(e.to_string()))
}

async fn run<S>(store: S, reminders: Arc<dyn timer::ReminderStore>, config: &Config) -> Result<()>
where
    S: event_store::EventStore + Clone + 'static,
{
    let node = Node::start(store, reminders, config).await?;
    shutdown_signal().await?;
    node.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config)?;

    // 2. Install Prometheus metrics exporter
    PrometheusBuilder::new()
        .with_http_listener(config.metrics_addr)
        .install()
        .map_err(|e| NodeError::Metrics(e.to_string()))?;
    tracing::info!(addr = %config.metrics_addr, "metrics exporter listening");

    // 3. Pick the backends and run until signalled
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
            let store = PostgresEventStore::new(pool.clone());
            store.run_migrations().await?;
            tracing::info!("using PostgreSQL stores");
            run(store, Arc::new(PostgresReminderStore::new(pool)), &config).await?;
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory stores");
            run(
                InMemoryEventStore::new(),
                Arc::new(InMemoryReminderStore::new()),
                &config,
            )
            .await?;
        }
    }

    tracing::info!("node shut down gracefully");
    Ok(())
}
