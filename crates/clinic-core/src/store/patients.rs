//! Patient store: the keyed collection of all patients.

use std::collections::BTreeMap;

use tracing::debug;

use super::{PatientBackend, StoreError, StoreResult};
use crate::models::{Patient, PatientFields};

/// Authoritative patient collection, iterated in ascending PHN order.
pub struct PatientStore {
    patients: BTreeMap<u64, Patient>,
    backend: Box<dyn PatientBackend>,
}

impl PatientStore {
    /// Open the store, loading whatever the backend holds.
    pub fn open(backend: Box<dyn PatientBackend>) -> StoreResult<Self> {
        let patients = backend.load()?;
        debug!(count = patients.len(), "Loaded patient store");
        Ok(Self { patients, backend })
    }

    /// Get a patient by PHN.
    pub fn search(&self, phn: u64) -> Option<&Patient> {
        self.patients.get(&phn)
    }

    pub fn contains(&self, phn: u64) -> bool {
        self.patients.contains_key(&phn)
    }

    pub fn len(&self) -> usize {
        self.patients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }

    /// Insert a new patient. Fails with `DuplicateKey` if the PHN is taken.
    pub fn create(&mut self, patient: Patient) -> StoreResult<Patient> {
        if self.contains(patient.phn) {
            return Err(StoreError::DuplicateKey(patient.phn));
        }
        let mut next = self.patients.clone();
        next.insert(patient.phn, patient.clone());
        self.commit(next)?;
        Ok(patient)
    }

    /// Patients whose name contains `needle`.
    pub fn retrieve(&self, needle: &str) -> Vec<Patient> {
        self.patients
            .values()
            .filter(|p| p.name_contains(needle))
            .cloned()
            .collect()
    }

    /// Overwrite a patient's attributes, re-keying it when `new_phn` differs.
    ///
    /// Returns `Ok(false)` if no patient exists at `old_phn`. The new PHN is
    /// checked before anything changes, so a `DuplicateKey` leaves the store
    /// as it was.
    pub fn update(
        &mut self,
        old_phn: u64,
        new_phn: u64,
        fields: PatientFields,
    ) -> StoreResult<bool> {
        if !self.contains(old_phn) {
            return Ok(false);
        }
        if new_phn != old_phn && self.contains(new_phn) {
            return Err(StoreError::DuplicateKey(new_phn));
        }

        let mut next = self.patients.clone();
        let Some(mut patient) = next.remove(&old_phn) else {
            return Ok(false);
        };
        patient.apply(fields);
        patient.phn = new_phn;
        next.insert(new_phn, patient);
        self.commit(next)?;
        Ok(true)
    }

    /// Remove a patient. Returns `Ok(false)` if the PHN is unknown.
    pub fn delete(&mut self, phn: u64) -> StoreResult<bool> {
        if !self.contains(phn) {
            return Ok(false);
        }
        let mut next = self.patients.clone();
        next.remove(&phn);
        self.commit(next)?;
        Ok(true)
    }

    pub fn list_all(&self) -> Vec<Patient> {
        self.patients.values().cloned().collect()
    }

    fn commit(&mut self, next: BTreeMap<u64, Patient>) -> StoreResult<()> {
        self.backend.save(&next)?;
        self.patients = next;
        debug!(count = self.patients.len(), "Flushed patient store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemPatientBackend;

    fn setup_store() -> PatientStore {
        PatientStore::open(Box::new(MemPatientBackend::new())).unwrap()
    }

    fn fields(name: &str) -> PatientFields {
        PatientFields::new(name, "1980-02-02", "250 555 0101", "p@clinic.ca", "12 Fort St")
    }

    #[test]
    fn test_create_and_search() {
        let mut store = setup_store();
        let created = store.create(Patient::new(9798884444, fields("Ali Mesbah"))).unwrap();

        let found = store.search(9798884444).unwrap();
        assert_eq!(found, &created);
        assert!(store.search(1).is_none());
    }

    #[test]
    fn test_create_duplicate_keeps_original() {
        let mut store = setup_store();
        store.create(Patient::new(1, fields("Original"))).unwrap();

        let err = store.create(Patient::new(1, fields("Impostor"))).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(1)));
        assert_eq!(store.search(1).unwrap().name, "Original");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_retrieve_by_name_substring() {
        let mut store = setup_store();
        store.create(Patient::new(1, fields("Joe Hancock"))).unwrap();
        store.create(Patient::new(2, fields("Joanne Smith"))).unwrap();
        store.create(Patient::new(3, fields("Ellen Ripley"))).unwrap();

        let found = store.retrieve("Jo");
        assert_eq!(found.len(), 2);
        assert!(found.iter().any(|p| p.name == "Joe Hancock"));
        assert!(found.iter().any(|p| p.name == "Joanne Smith"));
        assert!(store.retrieve("Zed").is_empty());
    }

    #[test]
    fn test_update_in_place() {
        let mut store = setup_store();
        store.create(Patient::new(5, fields("Before"))).unwrap();

        assert!(store.update(5, 5, fields("After")).unwrap());
        assert_eq!(store.search(5).unwrap().name, "After");
    }

    #[test]
    fn test_update_rekeys() {
        let mut store = setup_store();
        store.create(Patient::new(9191230002, fields("Nermin Terzic"))).unwrap();

        assert!(store
            .update(9191230002, 9191230003, fields("Nermin Terzic II"))
            .unwrap());
        assert!(store.search(9191230002).is_none());
        let moved = store.search(9191230003).unwrap();
        assert_eq!(moved.phn, 9191230003);
        assert_eq!(moved.name, "Nermin Terzic II");
    }

    #[test]
    fn test_update_rekey_collision_changes_nothing() {
        let mut store = setup_store();
        store.create(Patient::new(1, fields("One"))).unwrap();
        store.create(Patient::new(2, fields("Two"))).unwrap();

        let err = store.update(1, 2, fields("Changed")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(2)));
        assert_eq!(store.search(1).unwrap().name, "One");
        assert_eq!(store.search(2).unwrap().name, "Two");
    }

    #[test]
    fn test_update_and_delete_missing() {
        let mut store = setup_store();
        assert!(!store.update(9, 9, fields("Nobody")).unwrap());
        assert!(!store.delete(9).unwrap());
    }

    #[test]
    fn test_delete_and_list() {
        let mut store = setup_store();
        store.create(Patient::new(3, fields("C"))).unwrap();
        store.create(Patient::new(1, fields("A"))).unwrap();
        store.create(Patient::new(2, fields("B"))).unwrap();

        assert!(store.delete(2).unwrap());
        let phns: Vec<u64> = store.list_all().iter().map(|p| p.phn).collect();
        assert_eq!(phns, vec![1, 3]);
    }

    #[test]
    fn test_failed_flush_leaves_store_unchanged() {
        let backend = MemPatientBackend::new();
        backend.set_simulate_write_error(true);
        let mut store = PatientStore::open(Box::new(backend)).unwrap();

        assert!(store.create(Patient::new(1, fields("Ghost"))).is_err());
        assert!(store.is_empty());
    }
}
