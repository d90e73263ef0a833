//! The controller: single entry point for every clinic operation.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{Session, SessionError, SessionResult};
use crate::auth::{CredentialTable, Verification};
use crate::config::ClinicConfig;
use crate::models::{Note, Patient, PatientFields};
use crate::record::PatientRecord;
use crate::store::{
    JsonPatientFile, MemNoteBackend, MemPatientBackend, NoteBackend, NoteBlobDir, PatientStore,
    StoreError,
};

/// Gatekeeper in front of the patient and note stores.
///
/// Every operation other than `login` requires an authenticated session;
/// note operations additionally require a current patient. The current
/// patient is protected from update and delete until it is unset.
///
/// A patient's record is opened the first time they become current and
/// then kept for the controller's lifetime, so note codes keep climbing
/// across appointments and logins.
pub struct Controller {
    credentials: CredentialTable,
    patients: PatientStore,
    notes: Arc<dyn NoteBackend>,
    records: HashMap<u64, PatientRecord>,
    session: Session,
}

impl Controller {
    /// Assemble a controller from already-opened parts.
    pub fn new(
        credentials: CredentialTable,
        patients: PatientStore,
        notes: Arc<dyn NoteBackend>,
    ) -> Self {
        Self {
            credentials,
            patients,
            notes,
            records: HashMap::new(),
            session: Session::default(),
        }
    }

    /// Open a controller as the configuration describes.
    pub fn open(config: &ClinicConfig) -> SessionResult<Self> {
        if config.autosave {
            Self::durable(config)
        } else {
            Self::in_memory()
        }
    }

    /// Disk-backed controller rooted at `config.data_dir`.
    pub fn durable(config: &ClinicConfig) -> SessionResult<Self> {
        let records_dir = config.records_dir();
        fs::create_dir_all(&records_dir).map_err(|e| StoreError::io(&records_dir, e))?;

        let credentials = CredentialTable::from_file(config.users_file())?;
        let patients = PatientStore::open(Box::new(JsonPatientFile::new(config.patients_file())))?;
        info!(
            data_dir = %config.data_dir.display(),
            users = credentials.len(),
            patients = patients.len(),
            "Opened durable clinic"
        );
        Ok(Self::new(
            credentials,
            patients,
            Arc::new(NoteBlobDir::new(records_dir)),
        ))
    }

    /// Controller that keeps everything in memory, with built-in accounts.
    pub fn in_memory() -> SessionResult<Self> {
        let patients = PatientStore::open(Box::new(MemPatientBackend::new()))?;
        debug!("Opened in-memory clinic");
        Ok(Self::new(
            CredentialTable::builtin(),
            patients,
            Arc::new(MemNoteBackend::new()),
        ))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn username(&self) -> Option<&str> {
        self.session.user()
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    pub fn login(&mut self, username: &str, password: &str) -> SessionResult<bool> {
        if self.session.is_authenticated() {
            warn!(username, "Login rejected: session already active");
            return Err(SessionError::DuplicateSession);
        }
        match self.credentials.verify(username, password) {
            Verification::Accepted => {
                self.session.begin(username.to_string());
                info!(username, "User logged in");
                Ok(true)
            }
            Verification::UnknownUser | Verification::WrongPassword => {
                warn!(username, "Login rejected: invalid credentials");
                Err(SessionError::InvalidCredentials)
            }
        }
    }

    pub fn logout(&mut self) -> SessionResult<bool> {
        let Some(user) = self.session.user().map(str::to_string) else {
            return Err(SessionError::InvalidSession);
        };
        self.session.end();
        info!(username = %user, "User logged out");
        Ok(true)
    }

    // =========================================================================
    // Patients
    // =========================================================================

    pub fn search_patient(&self, phn: u64) -> SessionResult<Option<Patient>> {
        self.session.require_user()?;
        Ok(self.patients.search(phn).cloned())
    }

    pub fn create_patient(&mut self, phn: u64, fields: PatientFields) -> SessionResult<Patient> {
        self.session.require_user()?;
        let patient = self.patients.create(Patient::new(phn, fields))?;
        debug!(phn, "Created patient");
        Ok(patient)
    }

    pub fn retrieve_patients(&self, name: &str) -> SessionResult<Vec<Patient>> {
        self.session.require_user()?;
        Ok(self.patients.retrieve(name))
    }

    /// Replace a patient's attributes and possibly its PHN. The patient's
    /// notes follow it to the new PHN.
    ///
    /// The note blob moves first; if the patient store then fails to flush,
    /// the blob is moved back so neither store shows the change.
    pub fn update_patient(
        &mut self,
        original_phn: u64,
        new_phn: u64,
        fields: PatientFields,
    ) -> SessionResult<()> {
        self.ensure_mutable_patient(original_phn)?;
        let rekeyed = new_phn != original_phn;
        if rekeyed {
            if self.patients.contains(new_phn) {
                return Err(SessionError::DuplicateKey(new_phn));
            }
            self.notes.rekey(original_phn, new_phn)?;
        }

        let updated = match self.patients.update(original_phn, new_phn, fields) {
            Ok(updated) => updated,
            Err(e) => {
                if rekeyed {
                    if let Err(undo) = self.notes.rekey(new_phn, original_phn) {
                        warn!(original_phn, new_phn, error = %undo, "Failed to move note blob back");
                    }
                }
                return Err(e.into());
            }
        };
        if !updated {
            return Err(not_found(original_phn));
        }

        if rekeyed {
            if let Some(mut record) = self.records.remove(&original_phn) {
                record.rebind(new_phn);
                self.records.insert(new_phn, record);
            }
        }
        debug!(original_phn, new_phn, "Updated patient");
        Ok(())
    }

    /// Remove a patient together with their notes.
    ///
    /// The notes are removed first and restored if the patient store then
    /// fails to flush.
    pub fn delete_patient(&mut self, phn: u64) -> SessionResult<()> {
        self.ensure_mutable_patient(phn)?;
        let saved_notes = self.notes.load(phn)?;
        self.notes.remove(phn)?;

        let deleted = match self.patients.delete(phn) {
            Ok(deleted) => deleted,
            Err(e) => {
                if !saved_notes.is_empty() {
                    if let Err(undo) = self.notes.save(phn, &saved_notes) {
                        warn!(phn, error = %undo, "Failed to restore note blob");
                    }
                }
                return Err(e.into());
            }
        };
        if !deleted {
            return Err(not_found(phn));
        }

        self.records.remove(&phn);
        debug!(phn, "Deleted patient");
        Ok(())
    }

    pub fn list_patients(&self) -> SessionResult<Vec<Patient>> {
        self.session.require_user()?;
        Ok(self.patients.list_all())
    }

    fn ensure_mutable_patient(&self, phn: u64) -> SessionResult<()> {
        self.session.require_user()?;
        if !self.patients.contains(phn) {
            return Err(not_found(phn));
        }
        if self.session.current_phn() == Some(phn) {
            warn!(phn, "Rejected change to the current patient");
            return Err(SessionError::IllegalOperation(format!(
                "patient {} is the current patient",
                phn
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Current patient
    // =========================================================================

    /// Open `phn`'s record as the current patient. Leaves the previous
    /// current patient in place on failure.
    pub fn set_current_patient(&mut self, phn: u64) -> SessionResult<()> {
        self.session.require_user()?;
        if !self.patients.contains(phn) {
            return Err(not_found(phn));
        }
        if !self.records.contains_key(&phn) {
            let record = PatientRecord::open(phn, Arc::clone(&self.notes))?;
            self.records.insert(phn, record);
        }
        self.session.set_current(phn);
        debug!(phn, "Current patient set");
        Ok(())
    }

    /// The current patient, looked up afresh in the patient store.
    pub fn get_current_patient(&self) -> SessionResult<Option<Patient>> {
        self.session.require_user()?;
        Ok(self
            .session
            .current_phn()
            .and_then(|phn| self.patients.search(phn).cloned()))
    }

    pub fn unset_current_patient(&mut self) -> SessionResult<()> {
        self.session.require_user()?;
        self.session.clear_current();
        Ok(())
    }

    // =========================================================================
    // Notes of the current patient
    // =========================================================================

    fn current_record(&self) -> SessionResult<&PatientRecord> {
        let phn = self.session.require_current()?;
        self.records.get(&phn).ok_or(SessionError::NoCurrentPatient)
    }

    fn current_record_mut(&mut self) -> SessionResult<&mut PatientRecord> {
        let phn = self.session.require_current()?;
        self.records
            .get_mut(&phn)
            .ok_or(SessionError::NoCurrentPatient)
    }

    pub fn search_note(&self, code: u32) -> SessionResult<Option<Note>> {
        Ok(self.current_record()?.search_note(code).cloned())
    }

    pub fn create_note(&mut self, text: &str) -> SessionResult<Note> {
        let record = self.current_record_mut()?;
        let note = record.create_note(text)?;
        debug!(phn = record.phn(), code = note.code, "Created note");
        Ok(note)
    }

    pub fn retrieve_notes(&self, needle: &str) -> SessionResult<Vec<Note>> {
        Ok(self.current_record()?.retrieve_notes(needle))
    }

    /// Returns `false` if the current patient has no note with `code`.
    pub fn update_note(&mut self, code: u32, text: &str) -> SessionResult<bool> {
        Ok(self.current_record_mut()?.update_note(code, text)?)
    }

    /// Returns `false` if the current patient has no note with `code`.
    pub fn delete_note(&mut self, code: u32) -> SessionResult<bool> {
        Ok(self.current_record_mut()?.delete_note(code)?)
    }

    /// Notes of the current patient, most recent first.
    pub fn list_notes(&self) -> SessionResult<Vec<Note>> {
        Ok(self.current_record()?.list_notes())
    }
}

fn not_found(phn: u64) -> SessionError {
    SessionError::IllegalOperation(format!("no patient with PHN {}", phn))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logged_in() -> Controller {
        let mut controller = Controller::in_memory().unwrap();
        controller.login("user", "123456").unwrap();
        controller
    }

    fn fields(name: &str) -> PatientFields {
        PatientFields::new(name, "1990-05-05", "250 111 2222", "x@uvic.ca", "1 Gov St")
    }

    #[test]
    fn test_login_logout_cycle() {
        let mut controller = Controller::in_memory().unwrap();
        assert!(!controller.is_logged_in());
        assert!(controller.login("ali", "@G00dPassw0rd").unwrap());
        assert_eq!(controller.username(), Some("ali"));
        assert!(controller.logout().unwrap());
        assert!(!controller.is_logged_in());
        assert!(matches!(controller.logout(), Err(SessionError::InvalidSession)));
    }

    #[test]
    fn test_login_rejections() {
        let mut controller = Controller::in_memory().unwrap();
        assert!(matches!(
            controller.login("user", "wrong"),
            Err(SessionError::InvalidCredentials)
        ));
        assert!(matches!(
            controller.login("stranger", "123456"),
            Err(SessionError::InvalidCredentials)
        ));

        controller.login("user", "123456").unwrap();
        assert!(matches!(
            controller.login("user", "123456"),
            Err(SessionError::DuplicateSession)
        ));
        assert!(matches!(
            controller.login("nobody", "nothing"),
            Err(SessionError::DuplicateSession)
        ));
    }

    #[test]
    fn test_logged_out_access_denied() {
        let mut controller = Controller::in_memory().unwrap();
        assert!(matches!(controller.search_patient(1), Err(SessionError::AccessDenied)));
        assert!(matches!(controller.list_patients(), Err(SessionError::AccessDenied)));
        assert!(matches!(
            controller.create_patient(1, fields("A")),
            Err(SessionError::AccessDenied)
        ));
        assert!(matches!(controller.delete_patient(1), Err(SessionError::AccessDenied)));
        assert!(matches!(controller.unset_current_patient(), Err(SessionError::AccessDenied)));
        assert!(matches!(controller.create_note("x"), Err(SessionError::AccessDenied)));
        assert!(matches!(controller.list_notes(), Err(SessionError::AccessDenied)));
    }

    #[test]
    fn test_current_patient_is_locked() {
        let mut controller = logged_in();
        controller.create_patient(7, fields("Locked")).unwrap();
        controller.set_current_patient(7).unwrap();

        assert!(matches!(
            controller.update_patient(7, 7, fields("Changed")),
            Err(SessionError::IllegalOperation(_))
        ));
        assert!(matches!(
            controller.delete_patient(7),
            Err(SessionError::IllegalOperation(_))
        ));

        controller.unset_current_patient().unwrap();
        controller.update_patient(7, 7, fields("Changed")).unwrap();
        controller.delete_patient(7).unwrap();
        assert!(controller.search_patient(7).unwrap().is_none());
    }

    #[test]
    fn test_missing_patient_is_illegal() {
        let mut controller = logged_in();
        assert!(matches!(
            controller.update_patient(1, 2, fields("X")),
            Err(SessionError::IllegalOperation(_))
        ));
        assert!(matches!(
            controller.delete_patient(1),
            Err(SessionError::IllegalOperation(_))
        ));
    }

    #[test]
    fn test_set_current_unknown_keeps_previous() {
        let mut controller = logged_in();
        controller.create_patient(1, fields("One")).unwrap();
        controller.set_current_patient(1).unwrap();

        assert!(matches!(
            controller.set_current_patient(99),
            Err(SessionError::IllegalOperation(_))
        ));
        assert_eq!(controller.get_current_patient().unwrap().unwrap().phn, 1);
    }

    #[test]
    fn test_notes_follow_rekeyed_patient() {
        let mut controller = logged_in();
        controller.create_patient(10, fields("Mover")).unwrap();
        controller.set_current_patient(10).unwrap();
        controller.create_note("before the move").unwrap();
        controller.unset_current_patient().unwrap();

        controller.update_patient(10, 11, fields("Mover")).unwrap();
        controller.set_current_patient(11).unwrap();
        let notes = controller.list_notes().unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].text, "before the move");
    }

    #[test]
    fn test_deleted_patient_notes_do_not_resurface() {
        let mut controller = logged_in();
        controller.create_patient(20, fields("Gone")).unwrap();
        controller.set_current_patient(20).unwrap();
        controller.create_note("private").unwrap();
        controller.unset_current_patient().unwrap();
        controller.delete_patient(20).unwrap();

        controller.create_patient(20, fields("New Person")).unwrap();
        controller.set_current_patient(20).unwrap();
        assert!(controller.list_notes().unwrap().is_empty());
    }

    #[test]
    fn test_rekey_keeps_note_counter() {
        let mut controller = logged_in();
        controller.create_patient(30, fields("Counter")).unwrap();
        controller.set_current_patient(30).unwrap();
        controller.create_note("one").unwrap();
        controller.create_note("two").unwrap();
        controller.delete_note(2).unwrap();
        controller.unset_current_patient().unwrap();

        controller.update_patient(30, 31, fields("Counter")).unwrap();
        controller.set_current_patient(31).unwrap();
        assert_eq!(controller.create_note("three").unwrap().code, 3);
    }
}
