//! authorized_keys edit scripts.
//!
//! both scripts are idempotent: adding a key that is already present and
//! removing a key that is already absent exit 0 without touching the file.

use std::fmt;

use keygate_types::PublicKey;

/// the two mutations keygate performs on a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyOperation {
    /// append the key line unless an identical line exists.
    AddKey,
    /// drop every line identical to the key.
    RemoveKey,
}

impl KeyOperation {
    /// short name used in logs and error reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyOperation::AddKey => "add-key",
            KeyOperation::RemoveKey => "remove-key",
        }
    }

    /// shell script performing this operation for `key` in the login's
    /// `$HOME/.ssh/authorized_keys`.
    pub fn script(&self, key: &PublicKey) -> String {
        let key = shell_quote(key.as_str());
        match self {
            KeyOperation::AddKey => format!(
                "set -e\n\
                 umask 077\n\
                 mkdir -p \"$HOME/.ssh\"\n\
                 f=\"$HOME/.ssh/authorized_keys\"\n\
                 touch \"$f\"\n\
                 chmod 600 \"$f\"\n\
                 if grep -qxF -- {key} \"$f\"; then exit 0; fi\n\
                 if [ -s \"$f\" ] && [ -n \"$(tail -c 1 \"$f\")\" ]; then printf '\\n' >> \"$f\"; fi\n\
                 printf '%s\\n' {key} >> \"$f\"\n"
            ),
            KeyOperation::RemoveKey => format!(
                "set -e\n\
                 f=\"$HOME/.ssh/authorized_keys\"\n\
                 [ -f \"$f\" ] || exit 0\n\
                 grep -qxF -- {key} \"$f\" || exit 0\n\
                 t=$(mktemp \"$f.XXXXXX\")\n\
                 trap 'rm -f \"$t\"' EXIT\n\
                 grep -vxF -- {key} \"$f\" > \"$t\" || [ $? -eq 1 ]\n\
                 chmod 600 \"$t\"\n\
                 mv -f \"$t\" \"$f\"\n"
            ),
        }
    }
}

impl fmt::Display for KeyOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// wrap `s` in single quotes for a posix shell.
fn shell_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}
