//! Clinical note models.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A note attached to one patient's record.
///
/// `code` and `timestamp` are fixed at creation; only `text` changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Note {
    /// Per-patient sequence number, starting at 1
    pub code: u32,
    /// Free-text body
    pub text: String,
    /// Creation time
    pub timestamp: DateTime<Utc>,
}

impl Note {
    pub fn new(code: u32, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            code,
            text: text.into(),
            timestamp,
        }
    }

    pub fn text_contains(&self, needle: &str) -> bool {
        self.text.contains(needle)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}; {}; {}", self.code, self.timestamp, self.text)
    }
}
