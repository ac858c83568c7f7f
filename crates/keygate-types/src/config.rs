//! configuration types for keygate

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::DEFAULT_SSH_PORT;

/// main configuration for keygate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// address to bind the http server to.
    pub listen_addr: String,

    /// database configuration.
    pub database: DatabaseConfig,

    /// how the gateway reaches managed servers.
    pub gateway: GatewayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            database: DatabaseConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// database type: "sqlite" or "postgres".
    pub db_type: String,

    /// database connection string or file path.
    pub connection_string: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: "sqlite".to_string(),
            connection_string: "/var/lib/keygate/db.sqlite".to_string(),
        }
    }
}

/// gateway identity and session policy.
///
/// loaded once at startup and treated as read-only for the lifetime of the
/// process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// login used on servers that don't specify their own.
    pub login: String,

    /// private key presented to servers registered with the gateway key.
    pub private_key_path: Option<PathBuf>,

    /// passphrase for an encrypted private key.
    pub private_key_passphrase: Option<String>,

    /// known_hosts file used to verify server host keys.
    /// when unset, host keys are accepted without verification.
    pub known_hosts_path: Option<PathBuf>,

    /// upper bound for opening a session or running one remote command.
    pub session_timeout_secs: u64,

    /// the gateway host users log in to first, managed like any other server.
    pub jump_host: Option<JumpHostConfig>,
}

impl GatewayConfig {
    /// session timeout as a duration.
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            login: "deploy".to_string(),
            private_key_path: None,
            private_key_passphrase: None,
            known_hosts_path: None,
            session_timeout_secs: 15,
            jump_host: None,
        }
    }
}

/// jump host registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JumpHostConfig {
    /// hostname or ip address.
    pub host: String,

    /// ssh port.
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// login override for the jump host.
    #[serde(default)]
    pub login: Option<String>,
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}
