//! server endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use keygate_db::Database;
use keygate_shell::RemoteShell;
use keygate_types::{Credential, DEFAULT_SSH_PORT, Server, ServerId};

use crate::AppState;
use crate::handlers::{ApiError, JsonBody};

/// server representation in api responses. never includes the password.
#[derive(Debug, Serialize, Deserialize)]
pub struct ServerResponse {
    pub id: u64,
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    pub credential: String,
    pub created_at: String,
}

impl From<Server> for ServerResponse {
    fn from(server: Server) -> Self {
        Self {
            id: server.id.0,
            credential: server.credential.kind().to_string(),
            host: server.host,
            port: server.port,
            login: server.login,
            created_at: server.created_at.to_rfc3339(),
        }
    }
}

/// response wrapper for a single server.
#[derive(Debug, Serialize)]
pub struct ServerEnvelope {
    pub server: ServerResponse,
}

/// response wrapper for list servers endpoint.
#[derive(Debug, Serialize)]
pub struct ListServersResponse {
    pub servers: Vec<ServerResponse>,
}

/// request body for registering a server.
///
/// without a password the server is reached with the gateway key.
#[derive(Debug, Deserialize)]
pub struct CreateServerRequest {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// create the servers router.
pub fn router<S: RemoteShell + 'static>() -> Router<AppState<S>> {
    Router::new()
        .route(
            "/api/servers",
            get(list_servers::<S>).post(create_server::<S>),
        )
        .route(
            "/api/servers/{server_id}",
            get(get_server::<S>).delete(delete_server::<S>),
        )
}

/// `GET /api/servers`
async fn list_servers<S: RemoteShell + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Json<ListServersResponse>, ApiError> {
    let servers = state.db.list_servers().await?;
    debug!(count = servers.len(), "listing servers");

    Ok(Json(ListServersResponse {
        servers: servers.into_iter().map(ServerResponse::from).collect(),
    }))
}

/// `GET /api/servers/{server_id}`
async fn get_server<S: RemoteShell + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<u64>,
) -> Result<Json<ServerEnvelope>, ApiError> {
    let server = state.db.get_server(ServerId(id)).await?;
    Ok(Json(ServerEnvelope {
        server: ServerResponse::from(server),
    }))
}

/// `POST /api/servers`
async fn create_server<S: RemoteShell + 'static>(
    State(state): State<AppState<S>>,
    JsonBody(req): JsonBody<CreateServerRequest>,
) -> Result<(StatusCode, Json<ServerEnvelope>), ApiError> {
    let host = req.host.trim();
    if host.is_empty() || host.chars().any(char::is_whitespace) {
        return Err(ApiError::bad_request("host must be a non-empty hostname or address"));
    }
    if req.port == 0 {
        return Err(ApiError::bad_request("port must be between 1 and 65535"));
    }

    if state
        .db
        .get_server_by_address(host, req.port)
        .await?
        .is_some()
    {
        return Err(ApiError::conflict(format!(
            "server {}:{} already registered",
            host, req.port
        )));
    }

    let mut server = Server::new(ServerId(0), host.to_string(), req.port);
    server.login = req.login.filter(|l| !l.trim().is_empty());
    if let Some(password) = req.password.filter(|p| !p.is_empty()) {
        server.credential = Credential::Password(SecretString::from(password));
    }

    let server = state.db.create_server(&server).await?;
    info!(
        server_id = %server.id,
        address = %server.address(),
        credential = server.credential.kind(),
        "server registered"
    );

    Ok((
        StatusCode::CREATED,
        Json(ServerEnvelope {
            server: ServerResponse::from(server),
        }),
    ))
}

/// `DELETE /api/servers/{server_id}`
///
/// revokes every grant against the server before deleting it. the jump host
/// can't be deleted here.
async fn delete_server<S: RemoteShell + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    let server_id = ServerId(id);
    if state.jump_host == Some(server_id) {
        return Err(ApiError::conflict(format!(
            "server {} is the jump host and cannot be deleted",
            server_id
        )));
    }

    state.access.delete_server(server_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
