//! database error types.

use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// errors that can occur in database operations.
#[derive(Debug, Error)]
pub enum Error {
    /// referenced row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// uniqueness or referential constraint violation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// invalid data.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// generic database error.
    #[error("database error: {0}")]
    Database(String),
}

impl Error {
    /// whether this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// whether this is a conflict error.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}

impl From<DbErr> for Error {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(msg)) => return Error::Conflict(msg),
            Some(SqlErr::ForeignKeyConstraintViolation(msg)) => return Error::Conflict(msg),
            _ => {}
        }
        match &err {
            DbErr::RecordNotFound(msg) => Error::NotFound(msg.clone()),
            DbErr::Conn(e) => Error::Connection(e.to_string()),
            DbErr::ConnectionAcquire(e) => Error::Connection(e.to_string()),
            _ => Error::Database(err.to_string()),
        }
    }
}
