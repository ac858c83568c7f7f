//! user type representing a person whose key is distributed to servers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// unique identifier for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// a managed user.
///
/// each user carries exactly one public key. the key is stored as given and
/// only validated when it is about to be pushed to a host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// unique identifier.
    pub id: UserId,

    /// username, unique across the directory.
    pub name: String,

    /// display name - typically the user's full name.
    pub display_name: Option<String>,

    /// the authorized_keys line for this user.
    pub public_key: String,

    /// when the user was created.
    pub created_at: DateTime<Utc>,

    /// when the user was last updated.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// create a new user with the given name and key.
    ///
    /// pass `UserId(0)` to let the store assign an id.
    pub fn new(id: UserId, name: String, public_key: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            display_name: None,
            public_key,
            created_at: now,
            updated_at: now,
        }
    }

    /// display name or falls back to the username.
    pub fn display(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.name)
    }
}
