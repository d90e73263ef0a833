//! Patient record: a PHN bound to that patient's note store.

use std::sync::Arc;

use crate::models::Note;
use crate::store::{NoteBackend, NoteStore, StoreResult};

/// Everything kept on file for one patient beyond their demographics.
pub struct PatientRecord {
    notes: NoteStore,
}

impl PatientRecord {
    pub fn open(phn: u64, backend: Arc<dyn NoteBackend>) -> StoreResult<Self> {
        Ok(Self {
            notes: NoteStore::open(phn, backend)?,
        })
    }

    pub fn phn(&self) -> u64 {
        self.notes.phn()
    }

    pub(crate) fn rebind(&mut self, phn: u64) {
        self.notes.rebind(phn);
    }

    pub fn search_note(&self, code: u32) -> Option<&Note> {
        self.notes.search(code)
    }

    pub fn create_note(&mut self, text: impl Into<String>) -> StoreResult<Note> {
        self.notes.create(text)
    }

    pub fn retrieve_notes(&self, needle: &str) -> Vec<Note> {
        self.notes.retrieve(needle)
    }

    pub fn update_note(&mut self, code: u32, text: impl Into<String>) -> StoreResult<bool> {
        self.notes.update(code, text)
    }

    pub fn delete_note(&mut self, code: u32) -> StoreResult<bool> {
        self.notes.delete(code)
    }

    /// Notes in reverse chronological order.
    pub fn list_notes(&self) -> Vec<Note> {
        self.notes.list_all()
    }
}
