//! Persistence layer for patients and their notes.
//!
//! The stores own the in-memory collections and the invariants on them
//! (unique identifiers, note-code allocation). Where the bytes go is
//! decided by a backend chosen at construction:
//!
//! - [`fs`]: durable files (`patients.json`, `records/<phn>.dat`)
//! - [`memory`]: process-local snapshots, never touching disk
//!
//! Every mutation is flushed through the backend before it becomes
//! visible in the store, so a failed write leaves the store unchanged.

mod fs;
mod memory;
mod notes;
mod patients;

pub use fs::*;
pub use memory::*;
pub use notes::*;
pub use patients::*;

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

use crate::models::{Note, Patient};

/// Storage errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt note blob {}: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("Duplicate key: {0}")]
    DuplicateKey(u64),

    #[error("Backend unavailable: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Raw storage for the whole patient collection.
pub trait PatientBackend: Send + Sync {
    /// Load every patient. A store that was never saved loads as empty.
    fn load(&self) -> StoreResult<BTreeMap<u64, Patient>>;

    /// Replace the stored collection with `patients`.
    fn save(&self, patients: &BTreeMap<u64, Patient>) -> StoreResult<()>;
}

/// Raw storage for per-patient note collections, one unit per PHN.
pub trait NoteBackend: Send + Sync {
    /// Load the notes of one patient. A missing collection loads as empty.
    fn load(&self, phn: u64) -> StoreResult<BTreeMap<u32, Note>>;

    /// Replace the stored notes of one patient.
    fn save(&self, phn: u64, notes: &BTreeMap<u32, Note>) -> StoreResult<()>;

    /// Move a patient's notes to a new PHN. No-op if there are none.
    fn rekey(&self, old_phn: u64, new_phn: u64) -> StoreResult<()>;

    /// Drop a patient's notes. No-op if there are none.
    fn remove(&self, phn: u64) -> StoreResult<()>;
}
