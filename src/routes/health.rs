// src/routes/health.rs
//! Liveness check for the sensor ingestion service.
//!
//! `GET /health` answers as soon as the HTTP listener is up. It does not
//! check PostgreSQL or RabbitMQ: the broker is optional at runtime, and a
//! database outage already surfaces as 500s on `/api/sensors` and
//! `/api/alerts`.

use axum::{routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct Liveness {
    status: &'static str,
}

async fn handler() -> Json<Liveness> {
    Json(Liveness { status: "ok" })
}

/// Subrouter with the `/health` route, merged by the gateway under any state.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(handler))
}
