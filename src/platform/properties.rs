use crate::error::{PowerdownError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Persisted shutdown request, read back after a restart mid-sequence
pub const SHUTDOWN_ACTION_PROPERTY: &str = "sys.shutdown.requested";
/// Set while a shutdown sequence is in progress
pub const SHUTDOWN_RUNNING_PROPERTY: &str = "sys.shutdown.running";
/// Set once the radios have been asked to turn off
pub const RADIO_SHUTDOWN_PROPERTY: &str = "sys.radio.shutdown";

/// Key-value store that outlives the process
pub trait PropertyStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

/// One file per property under a directory
pub struct FilePropertyStore {
    dir: PathBuf,
}

impl FilePropertyStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains('/') || key.starts_with('.') {
            return Err(PowerdownError::property(key, "invalid property name"));
        }
        Ok(self.dir.join(key))
    }
}

impl PropertyStore for FilePropertyStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PowerdownError::property(key, e.to_string())),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)
            .map_err(|e| PowerdownError::property(key, format!("cannot create store: {}", e)))?;

        // Write then rename so a reader never sees a torn value
        let tmp = self.dir.join(format!(".{}.tmp", key));
        fs::write(&tmp, value).map_err(|e| PowerdownError::property(key, e.to_string()))?;
        fs::rename(&tmp, &path).map_err(|e| PowerdownError::property(key, e.to_string()))?;

        debug!("Property {} = {}", key, value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PowerdownError::property(key, e.to_string())),
        }
    }
}

/// Process-local store for dry runs and tests
#[derive(Default)]
pub struct MemoryPropertyStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryPropertyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PropertyStore for MemoryPropertyStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}
