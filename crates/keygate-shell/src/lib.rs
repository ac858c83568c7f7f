//! remote shell channel for keygate.
//!
//! a [`RemoteShell`] opens an authenticated [`ShellSession`] to a registered
//! server; the session runs one of two idempotent [`KeyOperation`]s against
//! the login's authorized_keys file.
//!
//! - [`SshShell`]: the production implementation over ssh
//! - [`test_utils::MemoryShell`]: an in-memory implementation with fault
//!   injection

#![warn(missing_docs)]

mod command;
mod error;
mod ssh;
pub mod test_utils;

use std::future::Future;

pub use command::KeyOperation;
pub use error::Error;
pub use ssh::{GatewayCredentials, SshSession, SshShell};

use keygate_types::{PublicKey, Server};

/// result type for remote shell operations.
pub type Result<T> = std::result::Result<T, Error>;

/// opens sessions to servers.
pub trait RemoteShell: Send + Sync {
    /// session type handed out by [`RemoteShell::open`].
    type Session: ShellSession;

    /// open an authenticated session using the server's credential.
    fn open(&self, server: &Server) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// an open session to one server.
///
/// dropping a session releases it; [`ShellSession::close`] is the orderly path.
pub trait ShellSession: Send {
    /// run `operation` for `key`.
    fn run(
        &mut self,
        operation: KeyOperation,
        key: &PublicKey,
    ) -> impl Future<Output = Result<()>> + Send;

    /// close the session.
    fn close(self) -> impl Future<Output = ()> + Send;
}
