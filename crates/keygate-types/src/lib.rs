//! core types for keygate - ssh key access management across a server fleet.
//!
//! this crate provides the data structures shared by every other keygate crate:
//! - [`User`]: a managed person holding exactly one ssh public key
//! - [`Server`]: a registered remote host and the credential used to reach it
//! - [`Grant`]: the tracked fact that a user's key is authorized on a server
//! - [`PublicKey`]: a validated authorized_keys line
//! - [`Config`]: application configuration

mod config;
mod grant;
mod public_key;
mod server;
mod user;
mod username;

pub use config::{Config, DatabaseConfig, GatewayConfig, JumpHostConfig};
pub use grant::{Grant, GrantKey};
pub use public_key::{KeyError, PublicKey, SUPPORTED_ALGORITHMS};
pub use server::{Credential, DEFAULT_SSH_PORT, Server, ServerId};
pub use user::{User, UserId};
pub use username::{MAX_USERNAME_LEN, Username, UsernameError};
