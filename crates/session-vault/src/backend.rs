//! Key-value backends for the vault.

use std::fs;
use std::path::{Path, PathBuf};

use crmlens_core_types::TabId;
use dashmap::DashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Minimal string key-value store. Implementations are fallible; the vault
/// above them swallows the failures.
pub trait KvBackend: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, VaultError>;
    fn write(&self, key: &str, value: &str) -> Result<(), VaultError>;
    fn remove(&self, key: &str) -> Result<(), VaultError>;
}

/// Process-local backend; state dies with the page.
pub struct MemoryBackend {
    entries: DashMap<String, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl KvBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<String>, VaultError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), VaultError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), VaultError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Backend storing one file per key under a root directory.
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root for one tab's records: `<root>/tabs/<tab-id>`.
    pub fn for_tab(root: impl AsRef<Path>, tab: &TabId) -> Self {
        Self::new(root.as_ref().join("tabs").join(&tab.0))
    }

    /// Root for records shared across tabs: `<root>/shared`.
    pub fn shared(root: impl AsRef<Path>) -> Self {
        Self::new(root.as_ref().join("shared"))
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.root.join(format!("{name}.json"))
    }
}

impl KvBackend for FileBackend {
    fn read(&self, key: &str) -> Result<Option<String>, VaultError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), VaultError> {
        fs::create_dir_all(&self.root)?;
        fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), VaultError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

pub mod testing {
    use super::{KvBackend, VaultError};

    /// Backend that fails every operation, for degraded-storage tests.
    pub struct FailingBackend;

    impl KvBackend for FailingBackend {
        fn read(&self, _key: &str) -> Result<Option<String>, VaultError> {
            Err(VaultError::Unavailable("storage disabled".into()))
        }

        fn write(&self, _key: &str, _value: &str) -> Result<(), VaultError> {
            Err(VaultError::Unavailable("storage disabled".into()))
        }

        fn remove(&self, _key: &str) -> Result<(), VaultError> {
            Err(VaultError::Unavailable("storage disabled".into()))
        }
    }
}
