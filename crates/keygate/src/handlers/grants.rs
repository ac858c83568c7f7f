//! grant endpoints: one (user, server) pair at a time.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::post,
};
use serde::Serialize;

use keygate_shell::RemoteShell;
use keygate_types::{Grant, ServerId, UserId};

use crate::AppState;
use crate::handlers::ApiError;

/// grant representation in api responses.
#[derive(Debug, Serialize)]
pub struct GrantResponse {
    pub user_id: u64,
    pub server_id: u64,
    pub created_at: String,
}

impl From<Grant> for GrantResponse {
    fn from(grant: Grant) -> Self {
        Self {
            user_id: grant.user_id.0,
            server_id: grant.server_id.0,
            created_at: grant.created_at.to_rfc3339(),
        }
    }
}

/// response wrapper for grant endpoint.
#[derive(Debug, Serialize)]
pub struct GrantEnvelope {
    pub grant: GrantResponse,
}

/// create the grants router.
pub fn router<S: RemoteShell + 'static>() -> Router<AppState<S>> {
    Router::new().route(
        "/api/users/{user_id}/servers/{server_id}",
        post(grant::<S>).delete(revoke::<S>),
    )
}

/// `POST /api/users/{user_id}/servers/{server_id}`
///
/// 201 when the grant is new, 200 when the pair was already granted.
async fn grant<S: RemoteShell + 'static>(
    State(state): State<AppState<S>>,
    Path((user_id, server_id)): Path<(u64, u64)>,
) -> Result<(StatusCode, Json<GrantEnvelope>), ApiError> {
    let outcome = state
        .access
        .grant(UserId(user_id), ServerId(server_id))
        .await?;

    // a repeated grant re-asserts the key but writes no new record
    let status = if outcome.is_created() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(GrantEnvelope {
            grant: GrantResponse::from(outcome.into_grant()),
        }),
    ))
}

/// `DELETE /api/users/{user_id}/servers/{server_id}`
async fn revoke<S: RemoteShell + 'static>(
    State(state): State<AppState<S>>,
    Path((user_id, server_id)): Path<(u64, u64)>,
) -> Result<StatusCode, ApiError> {
    state
        .access
        .revoke(UserId(user_id), ServerId(server_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
