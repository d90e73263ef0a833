//! Session layer: authentication state, the current patient, and the
//! controller that enforces both in front of the stores.

mod controller;

pub use controller::*;

use thiserror::Error;

use crate::auth::AuthError;
use crate::store::StoreError;

/// Errors raised by session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("A user is already logged in")]
    DuplicateSession,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("No user is logged in")]
    InvalidSession,

    #[error("Operation requires a logged-in user")]
    AccessDenied,

    #[error("No current patient is set")]
    NoCurrentPatient,

    #[error("Illegal operation: {0}")]
    IllegalOperation(String),

    #[error("Duplicate patient PHN: {0}")]
    DuplicateKey(u64),

    #[error("Storage error: {0}")]
    Store(#[source] StoreError),

    #[error("Credential error: {0}")]
    Auth(#[from] AuthError),
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateKey(phn) => SessionError::DuplicateKey(phn),
            other => SessionError::Store(other),
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Per-session context: who is logged in and which patient is current.
///
/// Only the PHN is held here; the patient's record stays with the
/// controller so its note counter outlives any one appointment.
#[derive(Debug, Default)]
pub struct Session {
    user: Option<String>,
    current: Option<u64>,
}

impl Session {
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// PHN of the current patient, if one is set.
    pub fn current_phn(&self) -> Option<u64> {
        self.current
    }

    pub(crate) fn require_user(&self) -> SessionResult<&str> {
        self.user.as_deref().ok_or(SessionError::AccessDenied)
    }

    /// The current PHN, checking login first and then the current patient.
    pub(crate) fn require_current(&self) -> SessionResult<u64> {
        self.require_user()?;
        self.current.ok_or(SessionError::NoCurrentPatient)
    }

    pub(crate) fn begin(&mut self, user: String) {
        self.user = Some(user);
        self.current = None;
    }

    pub(crate) fn end(&mut self) {
        self.user = None;
        self.current = None;
    }

    pub(crate) fn set_current(&mut self, phn: u64) {
        self.current = Some(phn);
    }

    pub(crate) fn clear_current(&mut self) {
        self.current = None;
    }
}
