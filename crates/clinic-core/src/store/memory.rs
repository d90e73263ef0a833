//! In-memory backends for non-durable sessions and tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{NoteBackend, PatientBackend, StoreError, StoreResult};
use crate::models::{Note, Patient};

fn lock<T>(mutex: &Mutex<T>) -> StoreResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| StoreError::Backend(format!("Lock poisoned: {}", e)))
}

fn simulated_failure(flag: &AtomicBool) -> StoreResult<()> {
    if flag.load(Ordering::SeqCst) {
        return Err(StoreError::Backend("Simulated write error".to_string()));
    }
    Ok(())
}

/// Keeps the last saved patient collection in process memory.
#[derive(Default)]
pub struct MemPatientBackend {
    snapshot: Mutex<BTreeMap<u64, Patient>>,
    simulate_write_error: AtomicBool,
}

impl MemPatientBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable write error simulation for testing error handling.
    pub fn set_simulate_write_error(&self, simulate: bool) {
        self.simulate_write_error.store(simulate, Ordering::SeqCst);
    }
}

impl PatientBackend for MemPatientBackend {
    fn load(&self) -> StoreResult<BTreeMap<u64, Patient>> {
        Ok(lock(&self.snapshot)?.clone())
    }

    fn save(&self, patients: &BTreeMap<u64, Patient>) -> StoreResult<()> {
        simulated_failure(&self.simulate_write_error)?;
        *lock(&self.snapshot)? = patients.clone();
        Ok(())
    }
}

/// Keeps every patient's notes in process memory, so reopening a record
/// within the same process sees earlier notes.
#[derive(Default)]
pub struct MemNoteBackend {
    records: Mutex<HashMap<u64, BTreeMap<u32, Note>>>,
    simulate_write_error: AtomicBool,
}

impl MemNoteBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable write error simulation for testing error handling.
    pub fn set_simulate_write_error(&self, simulate: bool) {
        self.simulate_write_error.store(simulate, Ordering::SeqCst);
    }
}

impl NoteBackend for MemNoteBackend {
    fn load(&self, phn: u64) -> StoreResult<BTreeMap<u32, Note>> {
        Ok(lock(&self.records)?.get(&phn).cloned().unwrap_or_default())
    }

    fn save(&self, phn: u64, notes: &BTreeMap<u32, Note>) -> StoreResult<()> {
        simulated_failure(&self.simulate_write_error)?;
        lock(&self.records)?.insert(phn, notes.clone());
        Ok(())
    }

    fn rekey(&self, old_phn: u64, new_phn: u64) -> StoreResult<()> {
        let mut records = lock(&self.records)?;
        if let Some(notes) = records.remove(&old_phn) {
            records.insert(new_phn, notes);
        }
        Ok(())
    }

    fn remove(&self, phn: u64) -> StoreResult<()> {
        lock(&self.records)?.remove(&phn);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_note_snapshots_are_per_patient() {
        let backend = MemNoteBackend::new();
        let mut notes = BTreeMap::new();
        notes.insert(1, Note::new(1, "a", Utc::now()));
        backend.save(10, &notes).unwrap();

        assert_eq!(backend.load(10).unwrap().len(), 1);
        assert!(backend.load(11).unwrap().is_empty());

        backend.rekey(10, 11).unwrap();
        assert!(backend.load(10).unwrap().is_empty());
        assert_eq!(backend.load(11).unwrap().len(), 1);

        backend.remove(11).unwrap();
        assert!(backend.load(11).unwrap().is_empty());
    }

    #[test]
    fn test_simulated_write_error() {
        let backend = MemPatientBackend::new();
        backend.set_simulate_write_error(true);
        let err = backend.save(&BTreeMap::new()).unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));

        backend.set_simulate_write_error(false);
        assert!(backend.save(&BTreeMap::new()).is_ok());
    }
}
