use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::domain::observation::Descriptor;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("identity {0:?} is already registered")]
    DuplicateId(String),
    #[error("invalid registry entry: {0}")]
    Invalid(String),
    #[error("cannot access registry {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse registry {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A protected identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub id: String,
    pub name: String,
    pub descriptor: Descriptor,
    /// Reference image (data URL or path); not read by the matching core.
    #[serde(default)]
    pub image: String,
    /// Optional commitment to the descriptor published by the registry owner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commitment: Option<String>,
}

impl RegistryEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>, descriptor: Descriptor) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            descriptor,
            image: String::new(),
            commitment: None,
        }
    }
}

/// Ordered collection of protected identities.
///
/// `entries` hands out an immutable snapshot; callers re-read it on every
/// pass so additions become visible on the next frame.
pub trait IdentityRegistry: Send + Sync {
    fn entries(&self) -> Arc<Vec<RegistryEntry>>;

    fn add(&self, entry: RegistryEntry) -> Result<(), RegistryError>;
}

/// Registry held only in memory. Readers never wait on a writer for longer
/// than a pointer swap.
#[derive(Default)]
pub struct InMemoryRegistry {
    entries: RwLock<Arc<Vec<RegistryEntry>>>,
}

impl InMemoryRegistry {
    pub fn new(entries: Vec<RegistryEntry>) -> Result<Self, RegistryError> {
        let registry = Self::default();
        for entry in entries {
            registry.add(entry)?;
        }
        Ok(registry)
    }
}

impl IdentityRegistry for InMemoryRegistry {
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
        *guard = Arc::new(appended(&guard, entry)?);
        Ok(())
    }
}

/// Copy of `entries` with `entry` appended, rejecting a reused id.
pub(crate) fn appended(
    entries: &[RegistryEntry],
    entry: RegistryEntry,
) -> Result<Vec<RegistryEntry>, RegistryError> {
    if entry.id.trim().is_empty() {
        return Err(RegistryError::Invalid("id must not be empty".into()));
    }
    if entries.iter().any(|e| e.id == entry.id) {
        return Err(RegistryError::DuplicateId(entry.id));
    }
    let mut next = Vec::with_capacity(entries.len() + 1);
    next.extend_from_slice(entries);
    next.push(entry);
    Ok(next)
}
