//! Clinic Core Library
//!
//! Patient records and appointment notes for a single clinic, with a
//! session layer that gates every operation behind a login.
//!
//! # Architecture
//!
//! ```text
//!   front-end (GUI / CLI / mobile)
//!                 │
//!                 ▼
//!   ┌───────────────────────────────┐
//!   │          Controller           │  login state, current patient,
//!   │                               │  cross-entity rules
//!   └───────┬───────────────┬───────┘
//!           │               │
//!           ▼               ▼
//!     PatientStore    PatientRecord ── NoteStore (one per patient)
//!           │                               │
//!           ▼                               ▼
//!    patients.json                 records/<phn>.dat
//!    (or memory)                      (or memory)
//! ```
//!
//! # Core Principle
//!
//! **The current patient cannot change underneath an appointment.** While a
//! patient is current, updating or deleting that patient is refused.
//!
//! # Modules
//!
//! - [`models`]: Domain types (Patient, Note)
//! - [`store`]: Patient and note stores with file and in-memory backends
//! - [`record`]: Per-patient record over a note store
//! - [`auth`]: Credential table and password digests
//! - [`session`]: Session context and the controller
//! - [`config`]: TOML configuration with environment overrides
//! - [`logging`]: Tracing subscriber setup

pub mod auth;
pub mod config;
pub mod logging;
pub mod models;
pub mod record;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use auth::{hash_password, CredentialTable};
pub use config::ClinicConfig;
pub use models::{Note, Patient, PatientFields};
pub use record::PatientRecord;
pub use session::{Controller, Session, SessionError};
pub use store::{NoteStore, PatientStore, StoreError};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ClinicError {
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
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl From<SessionError> for ClinicError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::DuplicateSession => ClinicError::DuplicateSession,
            SessionError::InvalidCredentials => ClinicError::InvalidCredentials,
            SessionError::InvalidSession => ClinicError::InvalidSession,
            SessionError::AccessDenied => ClinicError::AccessDenied,
            SessionError::NoCurrentPatient => ClinicError::NoCurrentPatient,
            SessionError::IllegalOperation(reason) => ClinicError::IllegalOperation(reason),
            SessionError::DuplicateKey(phn) => ClinicError::DuplicateKey(phn),
            SessionError::Store(e) => ClinicError::StorageError(e.to_string()),
            SessionError::Auth(e) => ClinicError::ConfigurationError(e.to_string()),
        }
    }
}

impl From<config::ConfigError> for ClinicError {
    fn from(e: config::ConfigError) -> Self {
        ClinicError::ConfigurationError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for ClinicError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ClinicError::StorageError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open a clinic described by the TOML configuration at the given path.
#[uniffi::export]
pub fn open_clinic(config_path: String) -> Result<Arc<ClinicCore>, ClinicError> {
    let config = ClinicConfig::load(&config_path)?;
    let controller = Controller::open(&config)?;
    Ok(Arc::new(ClinicCore {
        controller: Arc::new(Mutex::new(controller)),
    }))
}

/// Open a clinic that keeps everything in memory (for testing).
#[uniffi::export]
pub fn open_clinic_in_memory() -> Result<Arc<ClinicCore>, ClinicError> {
    let controller = Controller::in_memory()?;
    Ok(Arc::new(ClinicCore {
        controller: Arc::new(Mutex::new(controller)),
    }))
}

/// Install the tracing subscriber. Returns false if one was already set.
#[uniffi::export]
pub fn init_logging(filter: String) -> bool {
    logging::init(&filter)
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe controller wrapper for FFI.
#[derive(uniffi::Object)]
pub struct ClinicCore {
    controller: Arc<Mutex<Controller>>,
}

#[uniffi::export]
impl ClinicCore {
    // =========================================================================
    // Session Operations
    // =========================================================================

    pub fn login(&self, username: String, password: String) -> Result<bool, ClinicError> {
        let mut controller = self.controller.lock()?;
        Ok(controller.login(&username, &password)?)
    }

    pub fn logout(&self) -> Result<bool, ClinicError> {
        let mut controller = self.controller.lock()?;
        Ok(controller.logout()?)
    }

    pub fn is_logged_in(&self) -> Result<bool, ClinicError> {
        let controller = self.controller.lock()?;
        Ok(controller.is_logged_in())
    }

    // =========================================================================
    // Patient Operations
    // =========================================================================

    /// Get a patient by PHN.
    pub fn search_patient(&self, phn: u64) -> Result<Option<FfiPatient>, ClinicError> {
        let controller = self.controller.lock()?;
        Ok(controller.search_patient(phn)?.map(Into::into))
    }

    /// Create a new patient.
    pub fn create_patient(&self, patient: FfiPatient) -> Result<FfiPatient, ClinicError> {
        let mut controller = self.controller.lock()?;
        let (phn, fields) = patient.into_parts();
        Ok(controller.create_patient(phn, fields)?.into())
    }

    /// Patients whose name contains the given text.
    pub fn retrieve_patients(&self, name: String) -> Result<Vec<FfiPatient>, ClinicError> {
        let controller = self.controller.lock()?;
        let patients = controller.retrieve_patients(&name)?;
        Ok(patients.into_iter().map(Into::into).collect())
    }

    /// Overwrite the patient at `original_phn` with `patient`, PHN included.
    pub fn update_patient(
        &self,
        original_phn: u64,
        patient: FfiPatient,
    ) -> Result<(), ClinicError> {
        let mut controller = self.controller.lock()?;
        let (phn, fields) = patient.into_parts();
        Ok(controller.update_patient(original_phn, phn, fields)?)
    }

    pub fn delete_patient(&self, phn: u64) -> Result<(), ClinicError> {
        let mut controller = self.controller.lock()?;
        Ok(controller.delete_patient(phn)?)
    }

    pub fn list_patients(&self) -> Result<Vec<FfiPatient>, ClinicError> {
        let controller = self.controller.lock()?;
        let patients = controller.list_patients()?;
        Ok(patients.into_iter().map(Into::into).collect())
    }

    // =========================================================================
    // Current Patient
    // =========================================================================

    /// Start an appointment with the given patient.
    pub fn set_current_patient(&self, phn: u64) -> Result<(), ClinicError> {
        let mut controller = self.controller.lock()?;
        Ok(controller.set_current_patient(phn)?)
    }

    pub fn get_current_patient(&self) -> Result<Option<FfiPatient>, ClinicError> {
        let controller = self.controller.lock()?;
        Ok(controller.get_current_patient()?.map(Into::into))
    }

    /// End the current appointment.
    pub fn unset_current_patient(&self) -> Result<(), ClinicError> {
        let mut controller = self.controller.lock()?;
        Ok(controller.unset_current_patient()?)
    }

    // =========================================================================
    // Note Operations (current patient)
    // =========================================================================

    pub fn search_note(&self, code: u32) -> Result<Option<FfiNote>, ClinicError> {
        let controller = self.controller.lock()?;
        Ok(controller.search_note(code)?.map(Into::into))
    }

    pub fn create_note(&self, text: String) -> Result<FfiNote, ClinicError> {
        let mut controller = self.controller.lock()?;
        Ok(controller.create_note(&text)?.into())
    }

    pub fn retrieve_notes(&self, text: String) -> Result<Vec<FfiNote>, ClinicError> {
        let controller = self.controller.lock()?;
        let notes = controller.retrieve_notes(&text)?;
        Ok(notes.into_iter().map(Into::into).collect())
    }

    /// Returns false if the current patient has no such note.
    pub fn update_note(&self, code: u32, text: String) -> Result<bool, ClinicError> {
        let mut controller = self.controller.lock()?;
        Ok(controller.update_note(code, &text)?)
    }

    /// Returns false if the current patient has no such note.
    pub fn delete_note(&self, code: u32) -> Result<bool, ClinicError> {
        let mut controller = self.controller.lock()?;
        Ok(controller.delete_note(code)?)
    }

    /// Full record of the current patient, most recent note first.
    pub fn list_notes(&self) -> Result<Vec<FfiNote>, ClinicError> {
        let controller = self.controller.lock()?;
        let notes = controller.list_notes()?;
        Ok(notes.into_iter().map(Into::into).collect())
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe patient.
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct FfiPatient {
    pub phn: u64,
    pub name: String,
    pub birth_date: String,
    pub phone: String,
    pub email: String,
    pub address: String,
}

impl FfiPatient {
    fn into_parts(self) -> (u64, PatientFields) {
        (
            self.phn,
            PatientFields::new(self.name, self.birth_date, self.phone, self.email, self.address),
        )
    }
}

impl From<Patient> for FfiPatient {
    fn from(patient: Patient) -> Self {
        Self {
            phn: patient.phn,
            name: patient.name,
            birth_date: patient.birth_date,
            phone: patient.phone,
            email: patient.email,
            address: patient.address,
        }
    }
}

/// FFI-safe note. The timestamp is RFC 3339.
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct FfiNote {
    pub code: u32,
    pub text: String,
    pub timestamp: String,
}

impl From<Note> for FfiNote {
    fn from(note: Note) -> Self {
        Self {
            code: note.code,
            text: note.text,
            timestamp: note.timestamp.to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FfiPatient {
        FfiPatient {
            phn: 9792226666,
            name: "Lin Yao".into(),
            birth_date: "1985-03-03".into(),
            phone: "250 222 3333".into(),
            email: "lin@yao.ca".into(),
            address: "9 Cook St".into(),
        }
    }

    #[test]
    fn test_core_round_trip() {
        let core = open_clinic_in_memory().unwrap();
        assert!(matches!(core.list_patients(), Err(ClinicError::AccessDenied)));

        core.login("user".into(), "123456".into()).unwrap();
        let created = core.create_patient(sample()).unwrap();
        assert_eq!(created, sample());
        assert!(matches!(
            core.create_patient(sample()),
            Err(ClinicError::DuplicateKey(9792226666))
        ));

        core.set_current_patient(9792226666).unwrap();
        let note = core.create_note("initial consult".into()).unwrap();
        assert_eq!(note.code, 1);
        assert!(chrono::DateTime::parse_from_rfc3339(&note.timestamp).is_ok());
        assert!(core.update_note(1, "initial consult, revised".into()).unwrap());
        assert!(!core.delete_note(5).unwrap());

        assert!(matches!(
            core.delete_patient(9792226666),
            Err(ClinicError::IllegalOperation(_))
        ));
        assert_eq!(
            core.get_current_patient().unwrap().map(|p| p.phn),
            Some(9792226666)
        );

        assert!(core.logout().unwrap());
        assert!(!core.is_logged_in().unwrap());
    }

    #[test]
    fn test_no_current_patient() {
        let core = open_clinic_in_memory().unwrap();
        core.login("ali".into(), "@G00dPassw0rd".into()).unwrap();
        assert!(matches!(
            core.create_note("orphan".into()),
            Err(ClinicError::NoCurrentPatient)
        ));
    }

    #[test]
    fn test_missing_config_file() {
        let result = open_clinic("/nonexistent/clinic.toml".into());
        assert!(matches!(result, Err(ClinicError::ConfigurationError(_))));
    }
}
