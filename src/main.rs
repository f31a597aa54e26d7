//! Application entry point for the `stopfire-sensors` service.
//!
//! This binary orchestrates the full startup sequence for the sensor
//! ingestion API, including:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Establishing a PostgreSQL connection pool
//! - Creating the per-sensor tables if they do not exist
//! - Declaring the RabbitMQ exchange and queues (optional, best-effort)
//! - Mounting all API routes via the `routes` gateway (EMBP pattern)
//! - Binding the Axum HTTP server and serving requests until Ctrl-C
//!
//! # Environment Variables
//! See [`config::load_from_env`] for the full list. Logging is controlled by
//! `RUST_LOG` / `AXUM_LOG_LEVEL` (default: `debug`), `AXUM_SPAN_EVENTS` and
//! `FORCE_COLOR`.
//!
//! This module follows the Explicit Module Boundary Pattern (EMBP) by
//! delegating schema setup to `schema`, configuration parsing to `config`,
//! and route registration to `routes`.
use std::{env, io::IsTerminal, net::SocketAddr, sync::Arc};

use axum::Router;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use anyhow::Result;

mod alerts;
mod config;
mod error;
mod ingest;
mod models;
mod normalize;
mod publisher;
mod routes;
mod schema;
mod store;

#[cfg(test)]
mod testing;

pub use config::{BrokerConfig, Config};

// Re-exported for routes/*.rs so they only depend on their parent module
pub use alerts::AlertAggregator;
pub use error::{AggregatorError, IngestError};
pub use ingest::SensorIngestor;
pub use models::InboundReading;

use publisher::{Publisher, RabbitPublisher};
use store::{PgSensorStore, SensorStore};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(&cfg.db_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    tracing::info!("Successfully connected to database");

    schema::create_schema(&pool).await?;

    let store: Arc<dyn SensorStore> = Arc::new(PgSensorStore::new(pool));
    let publisher = connect_publisher(&cfg.broker).await;

    let ingestor = SensorIngestor::new(store.clone(), publisher);
    tracing::info!("Republishing readings: {}", ingestor.has_publisher());

    let state = routes::AppState {
        ingestor: Arc::new(ingestor),
        alerts: Arc::new(AlertAggregator::new(store)),
        publish_failure_is_error: cfg.publish_failure_is_error,
        validation_failure_is_bad_request: cfg.validation_failure_is_bad_request,
    };

    // Build app from routes gateway (EMBP)
    let app: Router = routes::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.server_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

// ---

/// Build the broker publisher, or `None` when disabled or unreachable.
///
/// An unreachable broker is not fatal; the service keeps storing readings
/// and simply does not republish them.
async fn connect_publisher(cfg: &BrokerConfig) -> Option<Arc<dyn Publisher>> {
    // ---
    if !cfg.enabled {
        tracing::info!("RabbitMQ disabled by configuration");
        return None;
    }

    let publisher = match RabbitPublisher::connect(cfg).await {
        Ok(publisher) => publisher,
        Err(e) => {
            tracing::warn!("Failed to connect to RabbitMQ: {}", e);
            tracing::warn!("Continuing without RabbitMQ integration");
            return None;
        }
    };

    match publisher.declare_topology().await {
        Ok(()) => {
            tracing::info!("Connected to RabbitMQ at {}:{}", cfg.host, cfg.port);
            Some(Arc::new(publisher))
        }
        Err(e) => {
            tracing::warn!("Failed to declare RabbitMQ topology: {}", e);
            tracing::warn!("Continuing without RabbitMQ integration");
            None
        }
    }
}

async fn shutdown_signal() {
    // ---
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `AXUM_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by the `AXUM_LOG_LEVEL` env var
///
/// This should be called once at application startup before any logging
/// or tracing macros are invoked. It installs the subscriber globally
/// for the lifetime of the process.
fn init_tracing() {
    // ---
    let span_events = match env::var("AXUM_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to AXUM_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("AXUM_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
