//! ssh implementation of the remote shell, built on russh.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use russh::client::{self, Handle};
use russh::keys::{PrivateKey, PrivateKeyWithHashAlg};
use russh::{ChannelMsg, Disconnect};
use secrecy::ExposeSecret;
use tracing::{debug, warn};

use keygate_types::{Credential, PublicKey, Server};

use crate::{Error, KeyOperation, RemoteShell, Result, ShellSession};

/// gateway key material, loaded once at startup and never mutated.
#[derive(Default)]
pub struct GatewayCredentials {
    private_key: Option<Arc<PrivateKey>>,
}

impl GatewayCredentials {
    /// no gateway key; only password servers can be reached.
    pub fn none() -> Self {
        Self::default()
    }

    /// load an openssh private key from disk.
    pub fn load(path: &Path, passphrase: Option<&str>) -> Result<Self> {
        let key = russh::keys::load_secret_key(path, passphrase).map_err(|e| {
            Error::Credential(format!("failed to load {}: {}", path.display(), e))
        })?;
        Ok(Self {
            private_key: Some(Arc::new(key)),
        })
    }

    /// whether a private key is loaded.
    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }
}

impl std::fmt::Debug for GatewayCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayCredentials")
            .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// remote shell that reaches servers over ssh.
pub struct SshShell {
    config: Arc<client::Config>,
    credentials: Arc<GatewayCredentials>,
    default_login: String,
    known_hosts: Option<PathBuf>,
}

impl SshShell {
    /// create a shell using the gateway credentials and the login applied to
    /// servers without their own.
    ///
    /// when `known_hosts` is `None` every host key is accepted.
    pub fn new(
        credentials: Arc<GatewayCredentials>,
        default_login: impl Into<String>,
        known_hosts: Option<PathBuf>,
    ) -> Self {
        Self {
            config: Arc::new(client::Config::default()),
            credentials,
            default_login: default_login.into(),
            known_hosts,
        }
    }
}

impl RemoteShell for SshShell {
    type Session = SshSession;

    async fn open(&self, server: &Server) -> Result<SshSession> {
        let address = server.address();
        let handler = HostKeyCheck {
            host: server.host.clone(),
            port: server.port,
            known_hosts: self.known_hosts.clone(),
        };

        let mut handle = client::connect(
            self.config.clone(),
            (server.host.as_str(), server.port),
            handler,
        )
        .await
        .map_err(|e| Error::Connect {
            address: address.clone(),
            message: e.to_string(),
        })?;

        let login = server.login_or(&self.default_login).to_string();
        let auth = match &server.credential {
            Credential::Password(password) => {
                handle
                    .authenticate_password(login.as_str(), password.expose_secret())
                    .await
            }
            Credential::GatewayKey => {
                let key = self.credentials.private_key.clone().ok_or_else(|| {
                    Error::Credential("no gateway private key configured".to_string())
                })?;
                let hash = handle.best_supported_rsa_hash().await?.flatten();
                handle
                    .authenticate_publickey(login.as_str(), PrivateKeyWithHashAlg::new(key, hash))
                    .await
            }
        }
        .map_err(|e| Error::Connect {
            address: address.clone(),
            message: e.to_string(),
        })?;

        if !auth.success() {
            return Err(Error::Auth { address, login });
        }

        debug!(%address, %login, credential = server.credential.kind(), "ssh session opened");
        Ok(SshSession { handle, address })
    }
}

/// an authenticated ssh connection to one server.
///
/// dropping the session drops the connection handle, which ends the
/// connection task; [`ShellSession::close`] additionally sends a disconnect.
pub struct SshSession {
    handle: Handle<HostKeyCheck>,
    address: String,
}

impl ShellSession for SshSession {
    async fn run(&mut self, operation: KeyOperation, key: &PublicKey) -> Result<()> {
        let mut channel = self.handle.channel_open_session().await?;
        channel.exec(true, operation.script(key)).await?;

        let mut exit_status = None;
        let mut stderr = Vec::new();
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::ExtendedData { data, ext: 1 } => stderr.extend_from_slice(&data),
                ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
                _ => {}
            }
        }

        match exit_status {
            Some(0) => {
                debug!(address = %self.address, %operation, "remote command succeeded");
                Ok(())
            }
            Some(code) => Err(Error::Command {
                exit_status: code,
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            }),
            None => Err(Error::Channel(format!(
                "{} closed the channel without an exit status",
                self.address
            ))),
        }
    }

    async fn close(self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            debug!(address = %self.address, error = %e, "disconnect failed");
        }
    }
}

/// verifies server host keys against a known_hosts file.
struct HostKeyCheck {
    host: String,
    port: u16,
    known_hosts: Option<PathBuf>,
}

impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let Some(path) = &self.known_hosts else {
            return Ok(true);
        };

        match russh::keys::check_known_hosts_path(&self.host, self.port, server_public_key, path) {
            Ok(true) => Ok(true),
            Ok(false) => {
                warn!(host = %self.host, port = self.port, "host key not in known_hosts");
                Ok(false)
            }
            Err(e) => {
                warn!(host = %self.host, port = self.port, error = %e, "host key check failed");
                Ok(false)
            }
        }
    }
}
