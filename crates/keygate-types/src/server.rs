//! server type representing a registered remote host.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// port used when a server is registered without one.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// unique identifier for a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerId(pub u64);

impl From<u64> for ServerId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ServerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// how the gateway authenticates when opening a session to a server.
#[derive(Debug)]
pub enum Credential {
    /// password login for this server.
    Password(SecretString),

    /// the gateway's own private key, loaded once at startup.
    GatewayKey,
}

impl Credential {
    /// short label for logs; never includes secret material.
    pub fn kind(&self) -> &'static str {
        match self {
            Credential::Password(_) => "password",
            Credential::GatewayKey => "gateway-key",
        }
    }
}

/// a remote host whose authorized_keys file keygate manages.
#[derive(Debug)]
pub struct Server {
    /// unique identifier.
    pub id: ServerId,

    /// hostname or ip address.
    pub host: String,

    /// ssh port.
    pub port: u16,

    /// login to use on this server. falls back to the gateway login when unset.
    pub login: Option<String>,

    /// credential used to open sessions.
    pub credential: Credential,

    /// when the server was registered.
    pub created_at: DateTime<Utc>,
}

impl Server {
    /// create a new server reached with the gateway key on the default login.
    ///
    /// pass `ServerId(0)` to let the store assign an id.
    pub fn new(id: ServerId, host: String, port: u16) -> Self {
        Self {
            id,
            host,
            port,
            login: None,
            credential: Credential::GatewayKey,
            created_at: Utc::now(),
        }
    }

    /// `host:port` form used in logs and as the session address.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// login for this server, or the provided fallback.
    pub fn login_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.login
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(fallback)
    }
}
