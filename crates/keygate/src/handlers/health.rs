//! health check endpoint handler

use std::time::Duration;

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tokio::time::timeout;

use keygate_db::Database;
use keygate_shell::RemoteShell;

use crate::AppState;

/// health check response body
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

/// content-type for health check responses per rfc 8040
const HEALTH_CONTENT_TYPE: &str = "application/health+json; charset=utf-8";

/// how long the store may take to answer a ping
const PING_TIMEOUT: Duration = Duration::from_secs(1);

/// `GET /health`
///
/// 200 with `{"status": "pass"}` when the directory store answers in time,
/// 500 with `{"status": "fail"}` otherwise. remote hosts are not probed.
pub async fn health<S: RemoteShell + 'static>(State(state): State<AppState<S>>) -> Response {
    let (status_code, status) = match timeout(PING_TIMEOUT, state.db.ping()).await {
        Ok(Ok(())) => (StatusCode::OK, "pass"),
        Ok(Err(_)) | Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "fail"),
    };

    (
        status_code,
        [(header::CONTENT_TYPE, HEALTH_CONTENT_TYPE)],
        Json(HealthResponse { status }),
    )
        .into_response()
}
