/**
 * REST API - configuration endpoints of the kernel
 *
 * ROUTES :
 * - GET  /config?mac=XX:XX:XX:XX:XX:XX  -> ConfigurationResponse (400 / 404 / 500)
 * - POST /reload                         -> re-read the instances file
 * - GET  /status                         -> instance count, last activity, idle time
 * - GET  /health                         -> liveness, does not count as activity
 *
 * Clients are not authenticated; the kernel is meant to live on the lab
 * management network only.
 */

use crate::models::StatusView;
use crate::service::{ConfigService, ResolveError};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ConfigService>,
}

#[derive(Debug, Deserialize)]
pub struct ConfigParams {
    mac: Option<String>,
}

impl IntoResponse for ResolveError {
    fn into_response(self) -> Response {
        let code = match self {
            ResolveError::InvalidMac(_) => StatusCode::BAD_REQUEST,
            ResolveError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        (code, self.to_string()).into_response()
    }
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/config", get(get_config))
        .route("/reload", post(reload))
        .route("/status", get(get_status))
        .with_state(app_state)
}

// GET /config?mac=...
async fn get_config(State(app): State<AppState>, Query(params): Query<ConfigParams>) -> Response {
    let Some(mac) = params.mac.filter(|m| !m.trim().is_empty()) else {
        app.service.activity().touch();
        return (StatusCode::BAD_REQUEST, "missing 'mac' query parameter").into_response();
    };

    let resolved = match app.service.resolve(&mac) {
        Ok(resolved) => resolved,
        Err(e) => return e.into_response(),
    };

    match serde_json::to_vec(&resolved) {
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            error!("failed to encode config for {}: {e}", resolved.hostname);
            (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
        }
    }
}

// POST /reload
async fn reload(State(app): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match app.service.reload().await {
        Ok(count) => (StatusCode::OK, Json(serde_json::json!({ "ok": true, "instances": count }))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "ok": false, "error": e.to_string() })),
        ),
    }
}

// GET /status
async fn get_status(State(app): State<AppState>) -> Json<StatusView> {
    Json(app.service.status())
}
