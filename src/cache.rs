//! Persistence of assembled matcher models, keyed by locus id.
use crate::error::{Result, VntrError};
use crate::hmm::MatcherModel;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A store of serialized models. Concurrent stores of the same key may
/// happen; the last writer wins.
pub trait ModelCache: Send + Sync {
    /// `Ok(None)` if there is no entry for `key`. A present but unreadable
    /// entry is an `Err(VntrError::ModelCache)`.
    fn load(&self, key: &str) -> Result<Option<MatcherModel>>;
    fn store(&self, key: &str, model: &MatcherModel) -> Result<()>;
}

/// One JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct DirectoryCache {
    root: PathBuf,
}

impl DirectoryCache {
    /// The directory is created if needed.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        std::fs::create_dir_all(root.as_ref())?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
        })
    }
    fn path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key))
    }
}

fn decode(key: &str, bytes: &[u8]) -> Result<MatcherModel> {
    let model: MatcherModel = serde_json::from_slice(bytes)
        .map_err(|why| VntrError::ModelCache(format!("{}: {}", key, why)))?;
    model
        .validate()
        .map_err(|why| VntrError::ModelCache(format!("{}: {}", key, why)))?;
    Ok(model)
}

impl ModelCache for DirectoryCache {
    fn load(&self, key: &str) -> Result<Option<MatcherModel>> {
        let bytes = match std::fs::read(self.path(key)) {
            Ok(bytes) => bytes,
            Err(why) if why.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(why) => return Err(why.into()),
        };
        decode(key, &bytes).map(Some)
    }
    fn store(&self, key: &str, model: &MatcherModel) -> Result<()> {
        let bytes = serde_json::to_vec(model)?;
        // Write aside and rename, so readers never see a partial file.
        let tmp = self.root.join(format!(
            ".{}.{}.{:?}.tmp",
            key,
            std::process::id(),
            std::thread::current().id()
        ));
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, self.path(key))?;
        Ok(())
    }
}

/// In-memory store, mainly for tests and one-shot batches.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Overwrite the raw bytes of an entry.
    pub fn insert_raw(&self, key: &str, bytes: Vec<u8>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), bytes);
        }
    }
}

impl ModelCache for MemoryCache {
    fn load(&self, key: &str) -> Result<Option<MatcherModel>> {
        let bytes = match self.entries.lock() {
            Ok(entries) => entries.get(key).cloned(),
            Err(_) => return Err(VntrError::ModelCache("poisoned lock".to_string())),
        };
        bytes.map(|bytes| decode(key, &bytes)).transpose()
    }
    fn store(&self, key: &str, model: &MatcherModel) -> Result<()> {
        let bytes = serde_json::to_vec(model)?;
        self.insert_raw(key, bytes);
        Ok(())
    }
}
