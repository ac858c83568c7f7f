//! keygate: an http gateway that grants and revokes users' ssh keys across a
//! fleet of servers, keeping a record of who can reach what.

pub mod cli;
pub mod handlers;

use std::sync::Arc;

use axum::{Router, routing::get};
use tracing::info;

use keygate_access::AccessOrchestrator;
use keygate_db::{Database, KeygateDb};
use keygate_shell::RemoteShell;
use keygate_types::{Config, Credential, JumpHostConfig, Server, ServerId};

/// shared state for http handlers.
pub struct AppState<S> {
    /// directory store.
    pub db: KeygateDb,
    /// grant/revoke orchestration over the store and the remote shell.
    pub access: Arc<AccessOrchestrator<KeygateDb, S>>,
    /// loaded configuration.
    pub config: Arc<Config>,
    /// id of the registered jump host, if one is configured.
    pub jump_host: Option<ServerId>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            access: Arc::clone(&self.access),
            config: Arc::clone(&self.config),
            jump_host: self.jump_host,
        }
    }
}

/// build the http router.
pub fn create_app<S: RemoteShell + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::<S>))
        .merge(handlers::users::router::<S>())
        .merge(handlers::servers::router::<S>())
        .merge(handlers::grants::router::<S>())
        .with_state(state)
}

/// make sure the jump host is registered, returning its id.
///
/// an existing server at the same address is reused as-is. a new one is
/// registered with the gateway key.
pub async fn ensure_jump_host<D: Database>(
    db: &D,
    jump: &JumpHostConfig,
) -> keygate_db::Result<ServerId> {
    if let Some(server) = db.get_server_by_address(&jump.host, jump.port).await? {
        info!(server_id = %server.id, address = %server.address(), "jump host already registered");
        return Ok(server.id);
    }

    let mut server = Server::new(ServerId(0), jump.host.clone(), jump.port);
    server.login = jump.login.clone();
    server.credential = Credential::GatewayKey;
    let server = db.create_server(&server).await?;
    info!(server_id = %server.id, address = %server.address(), "jump host registered");
    Ok(server.id)
}
