//! remote shell error types.

use std::time::Duration;

use thiserror::Error;

/// errors raised while opening a session or running a key operation.
#[derive(Debug, Error)]
pub enum Error {
    /// host unreachable, handshake failed or host key rejected.
    #[error("failed to connect to {address}: {message}")]
    Connect {
        /// `host:port` of the server.
        address: String,
        /// underlying failure.
        message: String,
    },

    /// the server rejected the credential.
    #[error("authentication rejected for {login}@{address}")]
    Auth {
        /// `host:port` of the server.
        address: String,
        /// login that was attempted.
        login: String,
    },

    /// the credential needed for this server isn't available.
    #[error("credential error: {0}")]
    Credential(String),

    /// session channel failure while running a command.
    #[error("channel error: {0}")]
    Channel(String),

    /// the command ran and exited non-zero.
    #[error("remote command exited with status {exit_status}: {stderr}")]
    Command {
        /// exit status reported by the remote shell.
        exit_status: u32,
        /// captured stderr, trimmed.
        stderr: String,
    },

    /// the session or command did not finish in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl Error {
    /// whether this error was raised by a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

impl From<russh::Error> for Error {
    fn from(err: russh::Error) -> Self {
        Error::Channel(err.to_string())
    }
}
