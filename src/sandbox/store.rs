//! On-disk metadata store: one JSON file per sandbox.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::record::SandboxRecord;

const EXTENSION: &str = "json";

/// Directory of `<name>.json` sandbox records.
///
/// Writes go to `<name>.json.tmp` first and are renamed into place, so a
/// reader never sees half a record. There is no locking: a single writer
/// per directory is assumed.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    dir: PathBuf,
}

impl MetadataStore {
    /// Uses `dir` as-is; it is not created.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Uses `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(dir);
        fs::create_dir_all(&store.dir)?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for `name`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, EXTENSION))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).exists()
    }

    /// Writes `record` atomically.
    pub fn save(&self, record: &SandboxRecord) -> Result<()> {
        let path = self.path_for(&record.name);
        let tmp = path.with_extension(format!("{}.tmp", EXTENSION));

        let body = serde_json::to_string_pretty(record).map_err(|source| Error::Encode {
            path: path.clone(),
            source,
        })?;
        fs::write(&tmp, body)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Reads the record for `name`.
    pub fn load(&self, name: &str) -> Result<SandboxRecord> {
        let path = self.path_for(name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::SandboxNotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        decode(&path, &bytes)
    }

    /// Reads every record in the directory.
    ///
    /// Only regular `*.json` files directly inside the directory count. One
    /// undecodable record fails the whole listing.
    pub fn list(&self) -> Result<Vec<SandboxRecord>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let bytes = fs::read(&path)?;
            records.push(decode(&path, &bytes)?);
        }
        Ok(records)
    }

    /// Deletes the record for `name`. Missing records are not an error.
    pub fn remove(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.path_for(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn decode(path: &Path, bytes: &[u8]) -> Result<SandboxRecord> {
    serde_json::from_slice(bytes).map_err(|source| Error::Decode {
        path: path.to_path_buf(),
        source,
    })
}
