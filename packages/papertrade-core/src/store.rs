//! Persistence backends for JSON documents.
//!
//! The ledger and the session state are each stored as one JSON document.
//! Backends only move raw text; (de)serialization stays with the owner.

use crate::Result;
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Raw document storage.
pub trait Backend: Send + Sync + Debug {
    /// Load the stored document, or `None` if nothing has been saved yet.
    fn load(&self) -> Result<Option<String>>;

    /// Replace the stored document.
    fn save(&self, contents: &str) -> Result<()>;
}

/// Stores a document in a file, creating parent directories as needed.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Backend for FileBackend {
    fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(&self.path)?))
    }

    fn save(&self, contents: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Write then rename so a crash never leaves a truncated document.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Keeps the document in memory. Used by tests and ephemeral ledgers.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    contents: Mutex<Option<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a pre-existing document.
    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            contents: Mutex::new(Some(contents.into())),
        }
    }
}

impl Backend for MemoryBackend {
    fn load(&self) -> Result<Option<String>> {
        Ok(self
            .contents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }

    fn save(&self, contents: &str) -> Result<()> {
        *self
            .contents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(contents.to_string());
        Ok(())
    }
}

/// Default location for a data file under `~/.papertrade/`.
///
/// `env_var` overrides the location when set.
pub fn default_data_path(env_var: &str, file_name: &str) -> PathBuf {
    if let Ok(path) = std::env::var(env_var) {
        return PathBuf::from(path);
    }

    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".papertrade").join(file_name))
        .unwrap_or_else(|| PathBuf::from(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_backend_missing_file_loads_none() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("ledger.json"));
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn test_file_backend_round_trip_creates_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/deeper/ledger.json");
        let backend = FileBackend::new(&path);

        backend.save("{\"a\":1}").unwrap();

        assert!(path.exists());
        assert_eq!(backend.load().unwrap().as_deref(), Some("{\"a\":1}"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_memory_backend() {
        let backend = MemoryBackend::new();
        assert!(backend.load().unwrap().is_none());

        backend.save("first").unwrap();
        backend.save("second").unwrap();
        assert_eq!(backend.load().unwrap().as_deref(), Some("second"));

        let seeded = MemoryBackend::with_contents("seed");
        assert_eq!(seeded.load().unwrap().as_deref(), Some("seed"));
    }

    #[test]
    fn test_default_data_path_env_override() {
        std::env::set_var("PAPERTRADE_TEST_STORE_PATH", "/tmp/custom.json");
        let path = default_data_path("PAPERTRADE_TEST_STORE_PATH", "ledger.json");
        assert_eq!(path, PathBuf::from("/tmp/custom.json"));
        std::env::remove_var("PAPERTRADE_TEST_STORE_PATH");
    }
}
