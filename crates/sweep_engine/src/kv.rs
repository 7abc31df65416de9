use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::PathBuf;

use fd_lock::RwLock;

use serde_json::Value;
use thiserror::Error;

use crate::persist::{ensure_dir, AtomicFileWriter, PersistError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
    #[error("malformed stored value for {key}: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("a run needs at least one item")]
    EmptyRun,
    #[error("store lock poisoned")]
    Poisoned,
    #[error("could not lock the data directory: {0}")]
    Lock(#[source] io::Error),
    #[error("store worker failed: {0}")]
    Worker(String),
}

/// Durable key-value storage with whole-value reads and writes only.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn set(&mut self, entries: Vec<(&str, Value)>) -> Result<(), StoreError>;
    fn remove(&mut self, keys: &[&str]) -> Result<(), StoreError>;

    /// Advisory lock shared with every other process using the same storage.
    /// Backends private to one process return `None`.
    fn process_lock(&self) -> Result<Option<RwLock<File>>, StoreError> {
        Ok(None)
    }
}

/// Keeps values in memory; durable only for the life of the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, entries: Vec<(&str, Value)>) -> Result<(), StoreError> {
        for (key, value) in entries {
            self.values.insert(key.to_string(), value);
        }
        Ok(())
    }

    fn remove(&mut self, keys: &[&str]) -> Result<(), StoreError> {
        for key in keys {
            self.values.remove(*key);
        }
        Ok(())
    }
}

/// Name of the lock file every process sharing a data directory agrees on.
pub const LOCK_FILE: &str = "sweep.lock";

/// One JSON file per key under a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    writer: AtomicFileWriter,
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            writer: AtomicFileWriter::new(dir.clone()),
            dir,
        }
    }

    fn filename(key: &str) -> String {
        format!("{key}.json")
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let Some(text) = self.writer.read(&Self::filename(key))? else {
            return Ok(None);
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| StoreError::Malformed {
                key: key.to_string(),
                source,
            })
    }

    fn set(&mut self, entries: Vec<(&str, Value)>) -> Result<(), StoreError> {
        for (key, value) in entries {
            let text = serde_json::to_string_pretty(&value)?;
            self.writer.write(&Self::filename(key), &text)?;
        }
        Ok(())
    }

    fn remove(&mut self, keys: &[&str]) -> Result<(), StoreError> {
        for key in keys {
            self.writer.remove(&Self::filename(key))?;
        }
        Ok(())
    }

    fn process_lock(&self) -> Result<Option<RwLock<File>>, StoreError> {
        ensure_dir(&self.dir)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(self.dir.join(LOCK_FILE))
            .map_err(StoreError::Lock)?;
        Ok(Some(RwLock::new(file)))
    }
}
