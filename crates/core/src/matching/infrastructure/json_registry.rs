use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::matching::domain::registry::{appended, IdentityRegistry, RegistryEntry, RegistryError};

/// Registry backed by a `faces.json` array on disk.
///
/// The file is read once at open. `add` rewrites the whole file through a
/// `.part` sibling and a rename, so a crash mid-write leaves the previous
/// file intact. In-memory entries change only after the write succeeded.
pub struct JsonFileRegistry {
    path: PathBuf,
    entries: RwLock<Arc<Vec<RegistryEntry>>>,
}

impl JsonFileRegistry {
    /// Opens the registry at `path`. A missing file is an empty registry.
    pub fn open(path: &Path) -> Result<Self, RegistryError> {
        let entries = match fs::read_to_string(path) {
            Ok(json) => parse(path, &json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No registry at {}, starting empty", path.display());
                Vec::new()
            }
            Err(e) => return Err(io_error(path, e)),
        };
        log::info!("Loaded {} registered identities", entries.len());
        Ok(Self {
            path: path.to_path_buf(),
            entries: RwLock::new(Arc::new(entries)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn parse(path: &Path, json: &str) -> Result<Vec<RegistryEntry>, RegistryError> {
    let parsed: Vec<RegistryEntry> =
        serde_json::from_str(json).map_err(|e| RegistryError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
    // Re-append one by one so duplicate ids in the file are reported.
    parsed
        .into_iter()
        .try_fold(Vec::new(), |acc, entry| appended(&acc, entry))
}

fn persist(path: &Path, entries: &[RegistryEntry]) -> Result<(), RegistryError> {
    let json = serde_json::to_string_pretty(entries).map_err(|e| RegistryError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }

    let temp_path = path.with_extension("part");
    let result = write_then_rename(&temp_path, path, json.as_bytes());
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn write_then_rename(temp_path: &Path, dest: &Path, bytes: &[u8]) -> Result<(), RegistryError> {
    let mut file = fs::File::create(temp_path).map_err(|e| io_error(temp_path, e))?;
    file.write_all(bytes).map_err(|e| io_error(temp_path, e))?;
    file.flush().map_err(|e| io_error(temp_path, e))?;
    drop(file);
    fs::rename(temp_path, dest).map_err(|e| io_error(dest, e))
}

fn io_error(path: &Path, source: std::io::Error) -> RegistryError {
    RegistryError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl IdentityRegistry for JsonFileRegistry {
    fn entries(&self) -> Arc<Vec<RegistryEntry>> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn add(&self, entry: RegistryEntry) -> Result<(), RegistryError> {
        let mut guard = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let id = entry.id.clone();
        let next = appended(&guard, entry)?;
        persist(&self.path, &next)?;
        *guard = Arc::new(next);
        log::info!("Registered identity {id:?} ({} total)", guard.len());
        Ok(())
    }
}
