//! cascading deletes of users and servers.
//!
//! every grant touching the subject is revoked through the orchestrator, in
//! store order, before the subject row is deleted. the first failed revoke
//! aborts the cascade: nothing else is attempted, revokes that already
//! succeeded stay revoked, and the subject row stays. retrying the delete only
//! walks the grants that remain. a grant whose row disappears between listing
//! and revoking counts as revoked.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use keygate_db::Database;
use keygate_shell::RemoteShell;
use keygate_types::{Grant, GrantKey, ServerId, UserId};

use crate::{AccessError, AccessOrchestrator, Result};

/// the row a cascade deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CascadeSubject {
    /// a user and every grant it holds.
    User(UserId),
    /// a server and every grant against it.
    Server(ServerId),
}

impl fmt::Display for CascadeSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CascadeSubject::User(id) => write!(f, "user {}", id),
            CascadeSubject::Server(id) => write!(f, "server {}", id),
        }
    }
}

/// outcome of a cascade that stopped at its first failed revoke.
#[derive(Debug)]
pub struct CascadeAborted {
    /// row that was being deleted; it still exists.
    pub subject: CascadeSubject,
    /// grants revoked before the failure. their rows are gone.
    pub revoked: Vec<GrantKey>,
    /// grant whose revoke failed. its row is kept.
    pub failed: GrantKey,
    /// why it failed.
    pub error: AccessError,
    /// grants after the failure, untouched.
    pub not_attempted: Vec<GrantKey>,
}

impl fmt::Display for CascadeAborted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "delete of {} aborted after {} revoked: {} failed ({}), {} not attempted",
            self.subject,
            self.revoked.len(),
            self.failed,
            self.error,
            self.not_attempted.len()
        )
    }
}

impl<D, S> AccessOrchestrator<D, S>
where
    D: Database,
    S: RemoteShell,
{
    /// revoke every grant the user holds, then delete the user.
    pub async fn delete_user(&self, user_id: UserId) -> Result<()> {
        self.load_user(user_id).await?;
        let grants = self
            .db()
            .list_grants_for_user(user_id)
            .await
            .map_err(AccessError::Store)?;

        self.revoke_all(CascadeSubject::User(user_id), grants).await?;

        self.db().delete_user(user_id).await.map_err(AccessError::Store)?;
        info!(%user_id, "user deleted");
        Ok(())
    }

    /// revoke every grant against the server, then delete the server.
    pub async fn delete_server(&self, server_id: ServerId) -> Result<()> {
        self.load_server(server_id).await?;
        let grants = self
            .db()
            .list_grants_for_server(server_id)
            .await
            .map_err(AccessError::Store)?;

        self.revoke_all(CascadeSubject::Server(server_id), grants)
            .await?;

        self.db()
            .delete_server(server_id)
            .await
            .map_err(AccessError::Store)?;
        info!(%server_id, "server deleted");
        Ok(())
    }

    async fn revoke_all(&self, subject: CascadeSubject, grants: Vec<Grant>) -> Result<()> {
        let keys: Vec<GrantKey> = grants.iter().map(Grant::key).collect();

        for (i, key) in keys.iter().enumerate() {
            match self.revoke(key.user_id, key.server_id).await {
                Ok(()) => {}
                // the key was still removed; only the row was already gone
                Err(AccessError::GrantNotFound(_)) => {
                    debug!(%subject, grant = %key, "grant already revoked");
                }
                Err(error) => {
                    let report = CascadeAborted {
                        subject,
                        revoked: keys[..i].to_vec(),
                        failed: *key,
                        error,
                        not_attempted: keys[i + 1..].to_vec(),
                    };
                    warn!(
                        %subject,
                        revoked = ?report.revoked,
                        failed = %report.failed,
                        not_attempted = ?report.not_attempted,
                        error = %report.error,
                        "cascade aborted"
                    );
                    return Err(AccessError::CascadeAborted(Box::new(report)));
                }
            }
        }

        if !keys.is_empty() {
            info!(%subject, revoked = keys.len(), "cascade revoked all grants");
        }
        Ok(())
    }
}
