use lime_core::{KeyValueStore, LimeError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

type Entries = BTreeMap<String, String>;

/// Key-value store persisted as one JSON object file.
///
/// The file is read on first access and rewritten after every mutation.
/// A missing file is an empty store.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<Option<Entries>>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Entries>>> {
        self.entries
            .lock()
            .map_err(|_| LimeError::StorageError("file store lock poisoned".into()))
    }

    fn load(&self) -> Result<Entries> {
        if !self.path.exists() {
            debug!("Store file {:?} not found, starting empty", self.path);
            return Ok(Entries::new());
        }

        let json = fs::read_to_string(&self.path)?;
        if json.trim().is_empty() {
            return Ok(Entries::new());
        }

        serde_json::from_str(&json).map_err(|e| {
            LimeError::StorageError(format!("Store file {:?} is not a JSON object of strings: {}", self.path, e))
        })
    }

    fn save(&self, entries: &Entries) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, json)?;

        debug!("Saved {} entries to {:?}", entries.len(), self.path);
        Ok(())
    }

    /// Runs `f` against the loaded entries, loading them first if needed.
    fn with_entries<T>(&self, f: impl FnOnce(&Entries) -> T) -> Result<T> {
        let mut guard = self.lock()?;
        let entries = match guard.take() {
            Some(entries) => entries,
            None => self.load()?,
        };
        Ok(f(guard.insert(entries)))
    }

    /// Applies `f` to a copy of the entries and writes it out. The cached
    /// entries only change once the file write succeeded.
    fn update(&self, f: impl FnOnce(&mut Entries) -> bool) -> Result<()> {
        let mut guard = self.lock()?;
        let current = match guard.take() {
            Some(entries) => entries,
            None => self.load()?,
        };

        let mut updated = current.clone();
        if !f(&mut updated) {
            *guard = Some(current);
            return Ok(());
        }

        match self.save(&updated) {
            Ok(()) => {
                *guard = Some(updated);
                Ok(())
            }
            Err(e) => {
                *guard = Some(current);
                Err(e)
            }
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_entries(|entries| entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|entries| entries.remove(key).is_some())
    }
}
