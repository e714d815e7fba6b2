use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// A document the store has located and can be asked to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHandle {
    pub path: String,
    location: PathBuf,
}

impl DocumentHandle {
    pub fn new(path: impl Into<String>, location: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            location: location.into(),
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
}

pub trait DocumentStore {
    fn lookup_document(&self, path: &str) -> Option<DocumentHandle>;

    fn read_document(&self, handle: &DocumentHandle) -> Result<String, DocumentError>;
}

/// Documents under a vault root, addressed by vault-relative paths.
#[derive(Debug, Clone)]
pub struct VaultStore {
    root: PathBuf,
}

impl VaultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve_relative(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
        if path.is_empty() || escapes {
            return None;
        }
        Some(self.root.join(relative))
    }
}

impl DocumentStore for VaultStore {
    fn lookup_document(&self, path: &str) -> Option<DocumentHandle> {
        let location = self.resolve_relative(path)?;
        location
            .is_file()
            .then(|| DocumentHandle::new(path, location))
    }

    fn read_document(&self, handle: &DocumentHandle) -> Result<String, DocumentError> {
        fs::read_to_string(handle.location()).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                DocumentError::NotFound(handle.path.clone())
            } else {
                DocumentError::Read {
                    path: handle.path.clone(),
                    source,
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "../tests/unit/vault_tests.rs"]
mod tests;
