use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::{error, info};

use super::AppState;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/api/alerts", get(handler))
}

/// Query parameters for `GET /api/alerts`
#[derive(Debug, Deserialize)]
struct AlertsQuery {
    user_id: Option<String>,
}

async fn handler(State(state): State<AppState>, Query(params): Query<AlertsQuery>) -> Response {
    // ---
    let Some(raw_user_id) = params.user_id.filter(|v| !v.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing user_id parameter").into_response();
    };
    let Ok(user_id) = raw_user_id.parse::<i64>() else {
        return (StatusCode::BAD_REQUEST, "Invalid user_id parameter").into_response();
    };

    match state.alerts.user_alerts(user_id).await {
        Ok(bundle) => {
            info!(
                "GET /api/alerts - user {} has {} devices",
                user_id,
                bundle.devices.len()
            );
            (StatusCode::OK, Json(bundle)).into_response()
        }
        Err(e) => {
            error!("Error getting user alerts: {}", e);
            e.into_response()
        }
    }
}
