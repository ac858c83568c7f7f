//! validated username type.
//!
//! usernames must:
//! - be 1-63 characters long
//! - contain only lowercase alphanumeric characters and hyphens
//! - not start or end with a hyphen

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// maximum length for a username.
pub const MAX_USERNAME_LEN: usize = 63;

/// error returned when a username is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsernameError {
    /// username is empty.
    #[error("username cannot be empty")]
    Empty,

    /// username exceeds [`MAX_USERNAME_LEN`].
    #[error("username too long ({0} characters, max {MAX_USERNAME_LEN})")]
    TooLong(usize),

    /// username contains characters outside `[a-z0-9-]`.
    #[error("username must contain only lowercase letters, digits and '-'")]
    InvalidCharacters,

    /// username starts or ends with a hyphen.
    #[error("username cannot start or end with a hyphen")]
    InvalidHyphenPosition,
}

/// a validated username string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    /// create a new username, validating the format.
    pub fn new(s: impl Into<String>) -> Result<Self, UsernameError> {
        let s = s.into();
        Self::validate(&s)?;
        Ok(Self(s))
    }

    /// get the username string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// consume the username and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }

    fn validate(s: &str) -> Result<(), UsernameError> {
        if s.is_empty() {
            return Err(UsernameError::Empty);
        }
        if s.len() > MAX_USERNAME_LEN {
            return Err(UsernameError::TooLong(s.len()));
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(UsernameError::InvalidCharacters);
        }
        if s.starts_with('-') || s.ends_with('-') {
            return Err(UsernameError::InvalidHyphenPosition);
        }
        Ok(())
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Username {
    type Err = UsernameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for Username {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}
