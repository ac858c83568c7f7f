//! grant and revoke for a single (user, server) pair.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use keygate_db::Database;
use keygate_shell::{KeyOperation, RemoteShell, ShellSession};
use keygate_types::{Grant, GrantKey, PublicKey, Server, ServerId, User, UserId};

use crate::{AccessError, Divergence, PairLocks, Result};

/// log target for host/store divergences.
pub const DIVERGENCE_TARGET: &str = "keygate::divergence";

/// a successful grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    /// the grant record was written by this call.
    Created(Grant),
    /// the pair was already granted; the key was re-asserted on the host.
    Existing(Grant),
}

impl GrantOutcome {
    /// the grant record.
    pub fn grant(&self) -> &Grant {
        match self {
            GrantOutcome::Created(grant) | GrantOutcome::Existing(grant) => grant,
        }
    }

    /// consume the outcome, keeping the grant record.
    pub fn into_grant(self) -> Grant {
        match self {
            GrantOutcome::Created(grant) | GrantOutcome::Existing(grant) => grant,
        }
    }

    /// whether this call wrote the record.
    pub fn is_created(&self) -> bool {
        matches!(self, GrantOutcome::Created(_))
    }
}

/// sequences validation, remote mutation and store mutation for one pair at a
/// time, compensating when the store write fails after the host was changed.
pub struct AccessOrchestrator<D, S> {
    db: D,
    shell: S,
    locks: PairLocks,
    session_timeout: Duration,
}

impl<D, S> AccessOrchestrator<D, S>
where
    D: Database,
    S: RemoteShell,
{
    /// create an orchestrator. `session_timeout` bounds opening a session and
    /// each remote command separately.
    pub fn new(db: D, shell: S, session_timeout: Duration) -> Self {
        Self {
            db,
            shell,
            locks: PairLocks::new(),
            session_timeout,
        }
    }

    /// the directory store.
    pub fn db(&self) -> &D {
        &self.db
    }

    /// the remote shell.
    pub fn shell(&self) -> &S {
        &self.shell
    }

    /// the per-pair lock arena.
    pub fn locks(&self) -> &PairLocks {
        &self.locks
    }

    // ─── Id-Based Entry Points ────────────────────────────────────────────────

    /// look up both sides and grant access.
    pub async fn grant(&self, user_id: UserId, server_id: ServerId) -> Result<GrantOutcome> {
        let user = self.load_user(user_id).await?;
        let server = self.load_server(server_id).await?;
        self.grant_access(&user, &server).await
    }

    /// look up both sides and revoke access.
    pub async fn revoke(&self, user_id: UserId, server_id: ServerId) -> Result<()> {
        let user = self.load_user(user_id).await?;
        let server = self.load_server(server_id).await?;
        self.revoke_access(&user, &server).await
    }

    pub(crate) async fn load_user(&self, id: UserId) -> Result<User> {
        self.db.get_user(id).await.map_err(|e| {
            if e.is_not_found() {
                AccessError::UserNotFound(id)
            } else {
                AccessError::Store(e)
            }
        })
    }

    pub(crate) async fn load_server(&self, id: ServerId) -> Result<Server> {
        self.db.get_server(id).await.map_err(|e| {
            if e.is_not_found() {
                AccessError::ServerNotFound(id)
            } else {
                AccessError::Store(e)
            }
        })
    }

    // ─── Grant ────────────────────────────────────────────────────────────────

    /// push the user's key to the server and record the grant.
    ///
    /// granting an already-granted pair re-asserts the key on the host and
    /// returns the existing record as [`GrantOutcome::Existing`].
    pub async fn grant_access(&self, user: &User, server: &Server) -> Result<GrantOutcome> {
        let key = PublicKey::parse(&user.public_key)?;
        let grant_key = GrantKey::new(user.id, server.id);

        let _pair = self.locks.acquire(grant_key).await;
        let existing = self.db.get_grant(grant_key).await.map_err(AccessError::Store)?;

        let mut session = self.open(server).await?;
        let result = self
            .grant_in_session(&mut session, server, grant_key, &key, existing)
            .await;
        session.close().await;

        if result.is_ok() {
            info!(user_id = %user.id, server_id = %server.id, "access granted");
        }
        result
    }

    async fn grant_in_session(
        &self,
        session: &mut S::Session,
        server: &Server,
        grant_key: GrantKey,
        key: &PublicKey,
        existing: Option<Grant>,
    ) -> Result<GrantOutcome> {
        self.run(session, server, KeyOperation::AddKey, key).await?;

        if let Some(grant) = existing {
            debug!(grant = %grant_key, "grant already recorded");
            return Ok(GrantOutcome::Existing(grant));
        }

        let store_err = match self.db.create_grant(&Grant::new(grant_key)).await {
            Ok(grant) => return Ok(GrantOutcome::Created(grant)),
            Err(e) => e,
        };

        warn!(
            grant = %grant_key,
            error = %store_err,
            "failed to record grant, removing key again"
        );
        match self.run(session, server, KeyOperation::RemoveKey, key).await {
            Ok(()) => Err(AccessError::Persistence {
                grant: grant_key,
                source: store_err,
            }),
            Err(compensation_err) => {
                let detail = format!(
                    "store insert failed ({}) and compensating remove failed ({})",
                    store_err, compensation_err
                );
                error!(
                    target: DIVERGENCE_TARGET,
                    grant = %grant_key,
                    address = %server.address(),
                    divergence = %Divergence::Dangling,
                    %detail,
                    "key is live on host without a grant record"
                );
                Err(AccessError::Consistency {
                    grant: grant_key,
                    divergence: Divergence::Dangling,
                    detail,
                })
            }
        }
    }

    // ─── Revoke ───────────────────────────────────────────────────────────────

    /// remove the user's key from the server, then delete the grant record.
    ///
    /// the remote removal runs before the record is looked at: revoking a pair
    /// with no record still removes the key and then reports
    /// [`AccessError::GrantNotFound`].
    pub async fn revoke_access(&self, user: &User, server: &Server) -> Result<()> {
        let key = PublicKey::parse(&user.public_key)?;
        let grant_key = GrantKey::new(user.id, server.id);

        let _pair = self.locks.acquire(grant_key).await;

        let mut session = self.open(server).await?;
        let removed = self
            .run(&mut session, server, KeyOperation::RemoveKey, &key)
            .await;
        session.close().await;
        removed?;

        match self.db.delete_grant(grant_key).await {
            Ok(()) => {
                info!(user_id = %user.id, server_id = %server.id, "access revoked");
                Ok(())
            }
            Err(e) if e.is_not_found() => Err(AccessError::GrantNotFound(grant_key)),
            Err(e) => {
                let detail = format!("key removed but grant delete failed ({})", e);
                error!(
                    target: DIVERGENCE_TARGET,
                    grant = %grant_key,
                    address = %server.address(),
                    divergence = %Divergence::Stale,
                    %detail,
                    "grant record outlives the key on host"
                );
                Err(AccessError::Consistency {
                    grant: grant_key,
                    divergence: Divergence::Stale,
                    detail,
                })
            }
        }
    }

    // ─── Session Helpers ──────────────────────────────────────────────────────

    async fn open(&self, server: &Server) -> Result<S::Session> {
        match tokio::time::timeout(self.session_timeout, self.shell.open(server)).await {
            Ok(Ok(session)) => Ok(session),
            Ok(Err(source)) => Err(AccessError::Connection {
                server: server.id,
                source,
            }),
            Err(_) => Err(AccessError::Connection {
                server: server.id,
                source: keygate_shell::Error::Timeout(self.session_timeout),
            }),
        }
    }

    async fn run(
        &self,
        session: &mut S::Session,
        server: &Server,
        operation: KeyOperation,
        key: &PublicKey,
    ) -> Result<()> {
        let source =
            match tokio::time::timeout(self.session_timeout, session.run(operation, key)).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => e,
                Err(_) => keygate_shell::Error::Timeout(self.session_timeout),
            };

        warn!(
            server_id = %server.id,
            address = %server.address(),
            %operation,
            error = %source,
            "remote key operation failed"
        );
        Err(AccessError::RemoteCommand {
            server: server.id,
            operation,
            source,
        })
    }
}
