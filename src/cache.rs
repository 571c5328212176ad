//! Result cache for LLM-graded metrics.
//!
//! Keys are opaque strings built by [`crate::grading::cache_key`]; they cover
//! the grading model, the full test case and the metric definition, so an
//! entry is only ever reused for an identical grading request.

use crate::error::CacheError;
use crate::models::MetricResult;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Storage for graded metric results
pub trait GradingCache: Send + Sync {
    fn get(&self, key: &str) -> Option<MetricResult>;

    fn put(&self, key: &str, result: &MetricResult) -> Result<(), CacheError>;
}

/// Cache that never stores anything
pub struct NoCache;

impl GradingCache for NoCache {
    fn get(&self, _key: &str) -> Option<MetricResult> {
        None
    }

    fn put(&self, _key: &str, _result: &MetricResult) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Process-local cache
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, MetricResult>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }
}

impl GradingCache for MemoryCache {
    fn get(&self, key: &str) -> Option<MetricResult> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn put(&self, key: &str, result: &MetricResult) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        entries.insert(key.to_string(), result.clone());
        Ok(())
    }
}

/// Cache persisted as a JSON object on disk, rewritten after every insert
pub struct JsonFileCache {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, MetricResult>>,
}

impl JsonFileCache {
    /// Open the cache at `path`, starting empty when the file does not exist
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        let entries: BTreeMap<String, MetricResult> = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| CacheError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            serde_json::from_str(&content).map_err(|source| CacheError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            BTreeMap::new()
        };

        debug!(path = %path.display(), entries = entries.len(), "opened grading cache");

        Ok(Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        })
    }

    fn persist(&self, entries: &BTreeMap<String, MetricResult>) -> Result<(), CacheError> {
        let io_error = |source| CacheError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }

        let content = serde_json::to_string(entries).map_err(|source| CacheError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        std::fs::write(&self.path, content).map_err(io_error)
    }
}

impl GradingCache for JsonFileCache {
    fn get(&self, key: &str) -> Option<MetricResult> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn put(&self, key: &str, result: &MetricResult) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        entries.insert(key.to_string(), result.clone());
        self.persist(&entries)
    }
}
