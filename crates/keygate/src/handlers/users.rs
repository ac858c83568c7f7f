//! user endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use keygate_access::DIVERGENCE_TARGET;
use keygate_db::Database;
use keygate_shell::RemoteShell;
use keygate_types::{PublicKey, User, UserId, Username};

use super::servers::ServerResponse;
use crate::AppState;
use crate::handlers::{ApiError, JsonBody};

/// maximum length for display name (characters).
const MAX_DISPLAY_NAME_LEN: usize = 255;

/// user representation in api responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: u64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub public_key: String,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id.0,
            name: user.name,
            display_name: user.display_name,
            public_key: user.public_key,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// response wrapper for a single user.
#[derive(Debug, Serialize)]
pub struct UserEnvelope {
    pub user: UserResponse,
}

/// response wrapper for list users endpoint.
#[derive(Debug, Serialize)]
pub struct ListUsersResponse {
    pub users: Vec<UserResponse>,
}

/// response wrapper for the servers a user can reach.
#[derive(Debug, Serialize)]
pub struct UserServersResponse {
    pub servers: Vec<ServerResponse>,
}

/// request body for creating a user.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: Username,
    #[serde(default)]
    pub display_name: Option<String>,
    pub public_key: String,
}

/// create the users router.
pub fn router<S: RemoteShell + 'static>() -> Router<AppState<S>> {
    Router::new()
        .route("/api/users", get(list_users::<S>).post(create_user::<S>))
        .route("/api/users/{user_id}", get(get_user::<S>).delete(delete_user::<S>))
        .route("/api/users/{user_id}/servers", get(list_user_servers::<S>))
}

/// `GET /api/users`
async fn list_users<S: RemoteShell + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Json<ListUsersResponse>, ApiError> {
    let users = state.db.list_users().await?;
    debug!(count = users.len(), "listing users");

    Ok(Json(ListUsersResponse {
        users: users.into_iter().map(UserResponse::from).collect(),
    }))
}

/// `GET /api/users/{user_id}`
async fn get_user<S: RemoteShell + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<u64>,
) -> Result<Json<UserEnvelope>, ApiError> {
    let user = state.db.get_user(UserId(id)).await?;
    Ok(Json(UserEnvelope {
        user: UserResponse::from(user),
    }))
}

/// `POST /api/users`
///
/// when a jump host is configured the new user's key is granted on it before
/// the request succeeds. if that grant fails the user is removed again, unless
/// the key was left on the jump host without a record.
async fn create_user<S: RemoteShell + 'static>(
    State(state): State<AppState<S>>,
    JsonBody(req): JsonBody<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserEnvelope>), ApiError> {
    if let Some(ref display_name) = req.display_name
        && display_name.chars().count() > MAX_DISPLAY_NAME_LEN
    {
        return Err(ApiError::bad_request(format!(
            "display_name exceeds maximum length of {} characters",
            MAX_DISPLAY_NAME_LEN
        )));
    }

    let public_key = PublicKey::parse(&req.public_key)
        .map_err(|e| ApiError::bad_request(format!("invalid public key: {}", e)))?;
    let name = req.name.into_inner();

    if state.db.get_user_by_name(&name).await?.is_some() {
        return Err(ApiError::conflict(format!("user '{}' already exists", name)));
    }

    let mut user = User::new(UserId(0), name, public_key.as_str().to_string());
    user.display_name = req.display_name;
    let user = state.db.create_user(&user).await?;
    info!(user_id = %user.id, name = %user.name, "user created");

    if let Some(jump_host) = state.jump_host {
        let granted = match state.db.get_server(jump_host).await {
            Ok(server) => state
                .access
                .grant_access(&user, &server)
                .await
                .map_err(ApiError::from),
            Err(e) => Err(ApiError::internal(format!(
                "jump host server {} unavailable: {}",
                jump_host, e
            ))),
        };

        if let Err(err) = granted {
            // a dangling key on the jump host needs the user row to be revoked later
            if let ApiError::Access(access_err) = &err
                && let Some(divergence) = access_err.divergence()
            {
                error!(
                    target: DIVERGENCE_TARGET,
                    user_id = %user.id,
                    server_id = %jump_host,
                    %divergence,
                    "jump host grant diverged, keeping user"
                );
                return Err(err);
            }

            match state.db.delete_user(user.id).await {
                Ok(()) => info!(user_id = %user.id, "user rolled back after jump host grant failed"),
                Err(e) => error!(
                    user_id = %user.id,
                    error = %e,
                    "failed to roll back user after jump host grant failed"
                ),
            }
            return Err(err);
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(UserEnvelope {
            user: UserResponse::from(user),
        }),
    ))
}

/// `DELETE /api/users/{user_id}`
///
/// revokes every grant the user holds before deleting the user.
async fn delete_user<S: RemoteShell + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    state.access.delete_user(UserId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/users/{user_id}/servers`
async fn list_user_servers<S: RemoteShell + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<u64>,
) -> Result<Json<UserServersResponse>, ApiError> {
    let user_id = UserId(id);
    state.db.get_user(user_id).await?;
    let servers = state.db.list_servers_for_user(user_id).await?;

    Ok(Json(UserServersResponse {
        servers: servers.into_iter().map(ServerResponse::from).collect(),
    }))
}
