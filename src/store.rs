//! Durable per-key counters backing the upload tracker.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::StoreError;

/// Key-value counter storage. Each key is independent; increments are
/// atomic per key with respect to process crashes but not across keys.
pub trait CounterStore: Send + Sync {
    /// Current value, or zero when the key has never been written.
    fn get(&self, key: &str) -> Result<u32, StoreError>;

    /// Add one and return the new value.
    fn increment(&self, key: &str) -> Result<u32, StoreError>;

    /// All counters whose key starts with `prefix`, sorted by key.
    fn enumerate(&self, prefix: &str) -> Result<Vec<(String, u32)>, StoreError>;
}

/// One `<key>.count` file per counter inside `dir`.
#[derive(Debug, Clone)]
pub struct FileCounterStore {
    dir: PathBuf,
}

const COUNTER_EXT: &str = "count";

impl FileCounterStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Keys must stay inside `dir`: no separators, no `..`.
    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() || key.contains(['/', '\\']) || key.contains("..") {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.{COUNTER_EXT}")))
    }

    fn read(path: &Path) -> Result<u32, StoreError> {
        match fs::read_to_string(path) {
            Ok(contents) => contents.trim().parse().map_err(|_| StoreError::Corrupt {
                path: path.to_path_buf(),
                contents,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(source) => Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

impl CounterStore for FileCounterStore {
    fn get(&self, key: &str) -> Result<u32, StoreError> {
        Self::read(&self.path_for(key)?)
    }

    fn increment(&self, key: &str) -> Result<u32, StoreError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| StoreError::Io { path, source }
        };

        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;
        let next = Self::read(&path)? + 1;

        // Write-then-rename keeps the counter whole if we crash mid-write.
        let tmp = self.dir.join(format!(".{key}.{COUNTER_EXT}.tmp"));
        fs::write(&tmp, next.to_string()).map_err(io_err(&tmp))?;
        fs::rename(&tmp, &path).map_err(io_err(&path))?;

        debug!(key, count = next, "Counter incremented");
        Ok(next)
    }

    fn enumerate(&self, prefix: &str) -> Result<Vec<(String, u32)>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut counters = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(COUNTER_EXT) {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if key.starts_with(prefix) {
                counters.push((key.to_string(), Self::read(&path)?));
            }
        }
        counters.sort();
        Ok(counters)
    }
}

#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: Mutex<BTreeMap<String, u32>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for MemoryCounterStore {
    fn get(&self, key: &str) -> Result<u32, StoreError> {
        Ok(self.counters.lock().get(key).copied().unwrap_or(0))
    }

    fn increment(&self, key: &str) -> Result<u32, StoreError> {
        let mut counters = self.counters.lock();
        let count = counters.entry(key.to_string()).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    fn enumerate(&self, prefix: &str) -> Result<Vec<(String, u32)>, StoreError> {
        Ok(self
            .counters
            .lock()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), *v))
            .collect())
    }
}
