//! Credential table and password digests.
//!
//! Passwords are never stored or compared in plaintext: the table maps a
//! username to the hex SHA-256 digest of its password, and a login attempt
//! is checked by digesting the offered password and comparing digests.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Credential loading errors.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Failed to read credential file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed credential entry on line {0}: expected `username,digest`")]
    Malformed(usize),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Outcome of checking a username/password pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Accepted,
    UnknownUser,
    WrongPassword,
}

/// Hex-encoded SHA-256 digest of a password.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Read-only lookup of username to password digest.
#[derive(Debug, Clone, Default)]
pub struct CredentialTable {
    digests: HashMap<String, String>,
}

impl CredentialTable {
    /// Load `username,digest` lines from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> AuthResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| AuthError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Parse `username,digest` lines. Blank lines are skipped.
    pub fn parse(contents: &str) -> AuthResult<Self> {
        let mut digests = HashMap::new();
        for (idx, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (user, digest) = line.split_once(',').ok_or(AuthError::Malformed(idx + 1))?;
            let (user, digest) = (user.trim(), digest.trim());
            if user.is_empty() || digest.is_empty() {
                return Err(AuthError::Malformed(idx + 1));
            }
            digests.insert(user.to_string(), digest.to_ascii_lowercase());
        }
        Ok(Self { digests })
    }

    /// The fixed accounts used when running without durable storage.
    pub fn builtin() -> Self {
        Self::default()
            .with_user("user", "123456")
            .with_user("ali", "@G00dPassw0rd")
    }

    /// Add an account from a plaintext password.
    pub fn with_user(mut self, username: impl Into<String>, password: &str) -> Self {
        self.digests.insert(username.into(), hash_password(password));
        self
    }

    pub fn contains(&self, username: &str) -> bool {
        self.digests.contains_key(username)
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    /// Check a login attempt by comparing digests.
    pub fn verify(&self, username: &str, password: &str) -> Verification {
        match self.digests.get(username) {
            None => Verification::UnknownUser,
            Some(stored) if *stored == hash_password(password) => Verification::Accepted,
            Some(_) => Verification::WrongPassword,
        }
    }
}
