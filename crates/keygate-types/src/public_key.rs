//! validated ssh public key line.
//!
//! a public key must:
//! - not be empty or whitespace-only
//! - start with a supported algorithm name followed by whitespace
//! - carry a non-empty key blob after the algorithm
//! - fit on a single authorized_keys line (no control characters)

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// algorithm names accepted at the start of a key line.
pub const SUPPORTED_ALGORITHMS: &[&str] = &[
    "ssh-rsa",
    "ssh-ed25519",
    "ssh-dss",
    "ecdsa-sha2-nistp256",
    "ecdsa-sha2-nistp384",
    "ecdsa-sha2-nistp521",
    "sk-ssh-ed25519@openssh.com",
    "sk-ecdsa-sha2-nistp256@openssh.com",
];

/// error returned when a public key fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// key is empty or whitespace-only.
    #[error("public key is empty")]
    Empty,

    /// key does not start with a supported algorithm.
    #[error("unsupported key type, expected one of: {}", SUPPORTED_ALGORITHMS.join(", "))]
    UnsupportedAlgorithm,

    /// algorithm present but no key material follows it.
    #[error("public key has no key data after the algorithm")]
    MissingKeyData,

    /// key contains characters that cannot appear in a single authorized_keys line.
    #[error("public key contains a forbidden character")]
    ForbiddenCharacter,
}

/// a validated public key, trimmed to the exact line written to authorized_keys.
///
/// # Example
/// ```
/// use keygate_types::PublicKey;
///
/// let key: PublicKey = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5 alice".parse().unwrap();
/// assert_eq!(key.algorithm(), "ssh-ed25519");
/// assert!("not-a-key".parse::<PublicKey>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublicKey(String);

impl PublicKey {
    /// validate and normalise a key string.
    pub fn parse(s: &str) -> Result<Self, KeyError> {
        let trimmed = s.trim();
        Self::validate(trimmed)?;
        Ok(Self(trimmed.to_string()))
    }

    /// check a key string without allocating.
    pub fn validate(s: &str) -> Result<(), KeyError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(KeyError::Empty);
        }

        // the key is embedded in a single-quoted shell word and must stay one line
        if s.chars().any(|c| c.is_control() || c == '\'') {
            return Err(KeyError::ForbiddenCharacter);
        }

        let mut fields = s.split_whitespace();
        let algorithm = fields.next().ok_or(KeyError::Empty)?;
        if !SUPPORTED_ALGORITHMS.contains(&algorithm) {
            return Err(KeyError::UnsupportedAlgorithm);
        }
        if fields.next().is_none() {
            return Err(KeyError::MissingKeyData);
        }

        Ok(())
    }

    /// algorithm name, e.g. `ssh-ed25519`.
    pub fn algorithm(&self) -> &str {
        self.0.split_whitespace().next().unwrap_or_default()
    }

    /// the full key line.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PublicKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PublicKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_common_algorithms() {
        for line in [
            "ssh-rsa AAAAB3NzaC1yc2EAAAADAQABAAABAQ bob@host",
            "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAI",
            "ecdsa-sha2-nistp256 AAAAE2VjZHNhLXNoYTItbmlzdHAyNTY= ops",
            "sk-ssh-ed25519@openssh.com AAAAGnNrLXNzaC1lZDI1NTE5QG9wZW5zc2guY29t",
        ] {
            assert!(PublicKey::parse(line).is_ok(), "{line} should be accepted");
        }
    }

    #[test]
    fn test_trims_surrounding_whitespace() {
        let key = PublicKey::parse("  ssh-ed25519 AAAAC3Nza alice  \n").unwrap();
        assert_eq!(key.as_str(), "ssh-ed25519 AAAAC3Nza alice");
        assert_eq!(key.algorithm(), "ssh-ed25519");
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(PublicKey::parse(""), Err(KeyError::Empty));
        assert_eq!(PublicKey::parse("   \t "), Err(KeyError::Empty));
    }

    #[test]
    fn test_rejects_unknown_prefix() {
        assert_eq!(
            PublicKey::parse("not-a-key"),
            Err(KeyError::UnsupportedAlgorithm)
        );
        // prefix must be a whole word
        assert_eq!(
            PublicKey::parse("ssh-rsaAAAAB3Nza"),
            Err(KeyError::UnsupportedAlgorithm)
        );
    }

    #[test]
    fn test_rejects_missing_blob() {
        assert_eq!(PublicKey::parse("ssh-ed25519"), Err(KeyError::MissingKeyData));
        assert_eq!(PublicKey::parse("ssh-ed25519   "), Err(KeyError::MissingKeyData));
    }

    #[test]
    fn test_rejects_multiline_and_quotes() {
        assert_eq!(
            PublicKey::parse("ssh-ed25519 AAAA\nssh-rsa BBBB"),
            Err(KeyError::ForbiddenCharacter)
        );
        assert_eq!(
            PublicKey::parse("ssh-ed25519 AAAA it's-me"),
            Err(KeyError::ForbiddenCharacter)
        );
    }
}
