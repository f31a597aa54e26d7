// src/routes/sensors.rs
//! Sensor ingestion endpoint.
//!
//! `POST /api/sensors` accepts one reading, stores it in its kind's table and
//! republishes it when a broker is configured.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::AppState;
use crate::{InboundReading, IngestError};

// ---

#[derive(Serialize)]
struct CreatedResponse {
    message: &'static str,
}

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/api/sensors", post(handler))
}

async fn handler(
    State(state): State<AppState>,
    payload: Result<Json<InboundReading>, JsonRejection>,
) -> Response {
    // ---
    let Json(reading) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!("POST /api/sensors - Invalid request body: {}", rejection.body_text());
            return (
                StatusCode::BAD_REQUEST,
                format!("Invalid request body: {}", rejection.body_text()),
            )
                .into_response();
        }
    };
    debug!("POST /api/sensors - Parsed sensor data: {:?}", reading);

    match state.ingestor.ingest(reading).await {
        Ok(outcome) => {
            info!(
                "Stored {} reading {} (published: {})",
                outcome.kind, outcome.id, outcome.published
            );
            created()
        }
        Err(e) if e.is_client_error() && state.validation_failure_is_bad_request => {
            warn!("Rejected sensor data: {}", e);
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
        Err(IngestError::Publish { stored_id, source }) if !state.publish_failure_is_error => {
            warn!(
                "Reading {} stored, publish failed and is not reported: {}",
                stored_id, source
            );
            created()
        }
        Err(e) => {
            error!("Error processing sensor data: {}", e);
            e.into_response()
        }
    }
}

fn created() -> Response {
    // ---
    (
        StatusCode::CREATED,
        Json(CreatedResponse {
            message: "Sensor data created successfully",
        }),
    )
        .into_response()
}
