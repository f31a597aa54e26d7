use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{
        header::{HeaderName, ACCEPT, AUTHORIZATION, CONTENT_TYPE, LINK},
        Method, StatusCode,
    },
    response::{IntoResponse, Response},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{AggregatorError, AlertAggregator, IngestError, SensorIngestor};

mod alerts;
mod health;
mod sensors;

// ---

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    // ---
    pub ingestor: Arc<SensorIngestor>,
    pub alerts: Arc<AlertAggregator>,

    /// When false, a stored-but-unpublished reading is still answered with 201.
    pub publish_failure_is_error: bool,

    /// When true, an unknown kind or unusable `estado` is answered with 400.
    pub validation_failure_is_bad_request: bool,
}

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(sensors::router())
        .merge(alerts::router())
        .merge(health::router())
        .with_state(state)
        .layer(cors())
        .layer(TraceLayer::new_for_http())
}

fn cors() -> CorsLayer {
    // ---
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            ACCEPT,
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-csrf-token"),
        ])
        .expose_headers([LINK])
        .max_age(Duration::from_secs(300))
}

// Errors are answered as plain text carrying the error message.

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

impl IntoResponse for AggregatorError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}
