//! grant type: the tracked (user, server) access relation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ServerId, UserId};

/// composite key of a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GrantKey {
    /// user whose key is authorized.
    pub user_id: UserId,
    /// server holding the key.
    pub server_id: ServerId,
}

impl GrantKey {
    /// create a new grant key.
    pub fn new(user_id: UserId, server_id: ServerId) -> Self {
        Self { user_id, server_id }
    }
}

impl std::fmt::Display for GrantKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "user {} on server {}", self.user_id, self.server_id)
    }
}

/// the asserted fact "the user's public key is present in the server's
/// authorized_keys".
///
/// grants are only created and removed by the access orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// user whose key is authorized.
    pub user_id: UserId,
    /// server holding the key.
    pub server_id: ServerId,
    /// when the grant was recorded.
    pub created_at: DateTime<Utc>,
}

impl Grant {
    /// create a grant record stamped with the current time.
    pub fn new(key: GrantKey) -> Self {
        Self {
            user_id: key.user_id,
            server_id: key.server_id,
            created_at: Utc::now(),
        }
    }

    /// composite key of this grant.
    pub fn key(&self) -> GrantKey {
        GrantKey::new(self.user_id, self.server_id)
    }
}
