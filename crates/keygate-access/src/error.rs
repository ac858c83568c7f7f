//! error taxonomy for grant, revoke and cascade operations.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use keygate_shell::KeyOperation;
use keygate_types::{GrantKey, KeyError, ServerId, UserId};

use crate::CascadeAborted;

/// direction of a divergence between a host and the directory store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Divergence {
    /// key is live on the host with no grant record.
    Dangling,
    /// grant record exists but the key is gone from the host.
    Stale,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Divergence::Dangling => f.write_str("dangling"),
            Divergence::Stale => f.write_str("stale"),
        }
    }
}

/// classified outcome of a failed access operation.
///
/// validation and not-found errors are raised before any side effect.
/// connection and remote-command errors leave the store untouched.
/// [`AccessError::Consistency`] means the host and the store disagree and an
/// operator has to reconcile them.
#[derive(Debug, Error)]
pub enum AccessError {
    /// the user's public key is malformed.
    #[error("invalid public key: {0}")]
    Validation(#[from] KeyError),

    /// no such user.
    #[error("user {0} not found")]
    UserNotFound(UserId),

    /// no such server.
    #[error("server {0} not found")]
    ServerNotFound(ServerId),

    /// no grant record for the pair.
    #[error("no grant for {0}")]
    GrantNotFound(GrantKey),

    /// the server could not be reached or rejected the credential.
    #[error("cannot reach server {server}: {source}")]
    Connection {
        /// target server.
        server: ServerId,
        /// shell failure.
        source: keygate_shell::Error,
    },

    /// a session was open but the key operation failed.
    #[error("{operation} failed on server {server}: {source}")]
    RemoteCommand {
        /// target server.
        server: ServerId,
        /// operation that failed.
        operation: KeyOperation,
        /// shell failure.
        source: keygate_shell::Error,
    },

    /// the grant could not be recorded; the remote key was removed again.
    #[error("failed to record grant for {grant}, remote key removed again: {source}")]
    Persistence {
        /// pair being granted.
        grant: GrantKey,
        /// store failure.
        source: keygate_db::Error,
    },

    /// the host and the store disagree about the pair.
    #[error("{divergence} grant for {grant}: {detail}")]
    Consistency {
        /// pair that diverged.
        grant: GrantKey,
        /// which side is ahead.
        divergence: Divergence,
        /// the failures that led here.
        detail: String,
    },

    /// a cascading delete stopped partway.
    #[error("{0}")]
    CascadeAborted(Box<CascadeAborted>),

    /// a store read or final row delete failed.
    #[error("directory store error: {0}")]
    Store(#[source] keygate_db::Error),
}

impl AccessError {
    /// whether this error names a missing user, server or grant.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AccessError::UserNotFound(_)
                | AccessError::ServerNotFound(_)
                | AccessError::GrantNotFound(_)
        )
    }

    /// the divergence carried by a consistency error.
    pub fn divergence(&self) -> Option<Divergence> {
        match self {
            AccessError::Consistency { divergence, .. } => Some(*divergence),
            _ => None,
        }
    }

    /// short machine-readable kind, used in api error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            AccessError::Validation(_) => "validation",
            AccessError::UserNotFound(_)
            | AccessError::ServerNotFound(_)
            | AccessError::GrantNotFound(_) => "not_found",
            AccessError::Connection { .. } => "connection",
            AccessError::RemoteCommand { .. } => "remote_command",
            AccessError::Persistence { .. } => "persistence",
            AccessError::Consistency { .. } => "consistency",
            AccessError::CascadeAborted(_) => "cascade_aborted",
            AccessError::Store(_) => "store",
        }
    }
}
