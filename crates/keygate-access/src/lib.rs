//! access grant orchestration for keygate.
//!
//! keeps each server's authorized_keys and the directory store's grant
//! records in step:
//! - [`AccessOrchestrator::grant_access`] pushes a key, then records the grant,
//!   removing the key again if the record can't be written
//! - [`AccessOrchestrator::revoke_access`] removes a key, then deletes the
//!   record
//! - [`AccessOrchestrator::delete_user`] / [`AccessOrchestrator::delete_server`]
//!   revoke every affected grant before the row is deleted
//!
//! operations on the same (user, server) pair never overlap; distinct pairs
//! run in parallel. there is no transaction spanning host and store, so
//! failures that leave the two disagreeing surface as
//! [`AccessError::Consistency`] and are logged under [`DIVERGENCE_TARGET`].

#![warn(missing_docs)]

mod cascade;
mod error;
mod orchestrator;
mod pair_lock;

pub use cascade::{CascadeAborted, CascadeSubject};
pub use error::{AccessError, Divergence};
pub use orchestrator::{AccessOrchestrator, DIVERGENCE_TARGET, GrantOutcome};
pub use pair_lock::{PairGuard, PairLocks};

/// result type for access operations.
pub type Result<T> = std::result::Result<T, AccessError>;
