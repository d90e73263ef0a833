//! Note store: one patient's notes and their code allocator.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use super::{NoteBackend, StoreResult};
use crate::models::Note;

/// Notes of exactly one patient.
///
/// Codes come from a counter that only moves forward, so a deleted code is
/// never handed out again while the store is open. On open the counter is
/// reseeded from the highest code present.
pub struct NoteStore {
    phn: u64,
    notes: BTreeMap<u32, Note>,
    last_code: u32,
    backend: Arc<dyn NoteBackend>,
}

impl NoteStore {
    /// Open the notes of `phn`, loading them wholesale from the backend.
    pub fn open(phn: u64, backend: Arc<dyn NoteBackend>) -> StoreResult<Self> {
        let notes = backend.load(phn)?;
        let last_code = notes.keys().next_back().copied().unwrap_or(0);
        debug!(phn, count = notes.len(), last_code, "Loaded note store");
        Ok(Self {
            phn,
            notes,
            last_code,
            backend,
        })
    }

    pub fn phn(&self) -> u64 {
        self.phn
    }

    /// Point the store at a new PHN after its blob has been moved there.
    pub(crate) fn rebind(&mut self, phn: u64) {
        self.phn = phn;
    }

    /// Code the next created note will receive.
    pub fn next_code(&self) -> u32 {
        self.last_code + 1
    }

    pub fn search(&self, code: u32) -> Option<&Note> {
        self.notes.get(&code)
    }

    /// Append a note stamped with the current time.
    pub fn create(&mut self, text: impl Into<String>) -> StoreResult<Note> {
        let code = self.next_code();
        let note = Note::new(code, text, Utc::now());

        let mut next = self.notes.clone();
        next.insert(code, note.clone());
        self.commit(next)?;
        self.last_code = code;
        Ok(note)
    }

    /// Notes whose text contains `needle`, in ascending code order.
    pub fn retrieve(&self, needle: &str) -> Vec<Note> {
        self.notes
            .values()
            .filter(|n| n.text_contains(needle))
            .cloned()
            .collect()
    }

    /// Replace a note's text. Returns `Ok(false)` if the code is unknown.
    pub fn update(&mut self, code: u32, text: impl Into<String>) -> StoreResult<bool> {
        if !self.notes.contains_key(&code) {
            return Ok(false);
        }
        let mut next = self.notes.clone();
        if let Some(note) = next.get_mut(&code) {
            note.text = text.into();
        }
        self.commit(next)?;
        Ok(true)
    }

    /// Remove a note. Returns `Ok(false)` if the code is unknown.
    pub fn delete(&mut self, code: u32) -> StoreResult<bool> {
        if !self.notes.contains_key(&code) {
            return Ok(false);
        }
        let mut next = self.notes.clone();
        next.remove(&code);
        self.commit(next)?;
        Ok(true)
    }

    /// All notes, most recent (highest code) first.
    pub fn list_all(&self) -> Vec<Note> {
        self.notes.values().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    fn commit(&mut self, next: BTreeMap<u32, Note>) -> StoreResult<()> {
        self.backend.save(self.phn, &next)?;
        self.notes = next;
        debug!(phn = self.phn, count = self.notes.len(), "Flushed note store");
        Ok(())
    }
}
