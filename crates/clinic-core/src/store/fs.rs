//! File-backed storage: a JSON document for patients and one
//! gzip-compressed blob per patient for notes.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;

use super::{NoteBackend, PatientBackend, StoreError, StoreResult};
use crate::models::{Note, Patient};

/// Patients stored as a pretty-printed JSON object keyed by PHN.
pub struct JsonPatientFile {
    path: PathBuf,
}

impl JsonPatientFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PatientBackend for JsonPatientFile {
    fn load(&self) -> StoreResult<BTreeMap<u64, Patient>> {
        let Some(bytes) = read_optional(&self.path)? else {
            debug!(path = %self.path.display(), "Patient file absent, starting empty");
            return Ok(BTreeMap::new());
        };
        // JSON object keys are strings; serde parses them back into u64.
        let patients: BTreeMap<u64, Patient> = serde_json::from_slice(&bytes)?;
        Ok(patients)
    }

    fn save(&self, patients: &BTreeMap<u64, Patient>) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(patients)?;
        write_atomic(&self.path, &json)
    }
}

/// Notes stored as `<dir>/<phn>.dat`, each holding the full collection.
pub struct NoteBlobDir {
    dir: PathBuf,
}

impl NoteBlobDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn blob_path(&self, phn: u64) -> PathBuf {
        self.dir.join(format!("{}.dat", phn))
    }

    fn decode(path: &Path, bytes: &[u8]) -> StoreResult<BTreeMap<u32, Note>> {
        let mut json = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut json)
            .map_err(|e| StoreError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let notes: Vec<Note> = serde_json::from_slice(&json).map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(notes.into_iter().map(|n| (n.code, n)).collect())
    }

    fn encode(path: &Path, notes: &BTreeMap<u32, Note>) -> StoreResult<Vec<u8>> {
        let list: Vec<&Note> = notes.values().collect();
        let json = serde_json::to_vec(&list)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&json)
            .map_err(|e| StoreError::io(path, e))?;
        encoder.finish().map_err(|e| StoreError::io(path, e))
    }
}

impl NoteBackend for NoteBlobDir {
    fn load(&self, phn: u64) -> StoreResult<BTreeMap<u32, Note>> {
        let path = self.blob_path(phn);
        match read_optional(&path)? {
            Some(bytes) => Self::decode(&path, &bytes),
            None => Ok(BTreeMap::new()),
        }
    }

    fn save(&self, phn: u64, notes: &BTreeMap<u32, Note>) -> StoreResult<()> {
        let path = self.blob_path(phn);
        let blob = Self::encode(&path, notes)?;
        write_atomic(&path, &blob)
    }

    fn rekey(&self, old_phn: u64, new_phn: u64) -> StoreResult<()> {
        let from = self.blob_path(old_phn);
        let to = self.blob_path(new_phn);
        match fs::rename(&from, &to) {
            Ok(()) => {
                debug!(old_phn, new_phn, "Moved note blob");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(from, e)),
        }
    }

    fn remove(&self, phn: u64) -> StoreResult<()> {
        let path = self.blob_path(phn);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }
}

/// Read a whole file, mapping "does not exist" to `None`.
fn read_optional(path: &Path) -> StoreResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Overwrite `path` by writing a sibling temp file and renaming it into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|e| StoreError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))?;
    Ok(())
}
