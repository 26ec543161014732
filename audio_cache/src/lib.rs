//! Disk-backed LRU cache for synthesized PCM audio.
//!
//! One file per key under the cache directory, raw bytes, no header. The
//! index lives in memory and is rebuilt from the directory on startup, so
//! cached audio survives restarts.

mod key;

pub use key::cache_key;

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use thiserror::Error;
use tracing::{debug, info, warn};

const FILE_EXT: &str = "pcm";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache: create dir {dir}: {source}")]
    CreateDir { dir: PathBuf, source: io::Error },

    #[error("cache: write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

struct Entry {
    size: u64,
    accessed_at: SystemTime,
    path: PathBuf,
}

/// Disk-backed LRU cache with a total size cap in bytes.
pub struct AudioCache {
    dir: PathBuf,
    max_bytes: u64,
    index: Mutex<HashMap<String, Entry>>,
}

impl AudioCache {
    /// Opens (or creates) the cache directory and loads any existing `.pcm`
    /// files into the index, evicting down to `max_bytes` if a previous run
    /// left more behind than the current cap allows.
    pub fn new(dir: impl Into<PathBuf>, max_bytes: u64) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| CacheError::CreateDir {
            dir: dir.clone(),
            source,
        })?;
        let cache = Self {
            dir,
            max_bytes,
            index: Mutex::new(HashMap::new()),
        };
        cache.load_existing();
        Ok(cache)
    }

    /// Returns the cached bytes for `key`, refreshing its recency, or `None`
    /// on a miss. A backing file that vanished or became unreadable is
    /// treated as a miss and its stale index entry is dropped.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut index = self.index.lock().unwrap();
        let entry = index.get_mut(key)?;
        match fs::read(&entry.path) {
            Ok(data) => {
                entry.accessed_at = SystemTime::now();
                Some(data)
            }
            Err(err) => {
                warn!(key, error = %err, "cache file unreadable, removing entry");
                index.remove(key);
                None
            }
        }
    }

    /// Stores `data` under `key`, evicting least-recently-accessed entries
    /// first when the cap would be exceeded. Entries larger than the cap are
    /// silently skipped. The index is only updated after a successful write.
    pub fn put(&self, key: &str, data: &[u8]) -> Result<(), CacheError> {
        let new_size = data.len() as u64;
        if new_size > self.max_bytes {
            return Ok(());
        }

        let mut index = self.index.lock().unwrap();

        // Replacing a key: drop the old file and entry before making room.
        if let Some(old) = index.remove(key) {
            let _ = fs::remove_file(&old.path);
        }

        evict(&mut index, self.max_bytes, new_size);

        let path = entry_path(&self.dir, key);
        fs::write(&path, data).map_err(|source| CacheError::Write {
            path: path.clone(),
            source,
        })?;

        index.insert(
            key.to_string(),
            Entry {
                size: new_size,
                accessed_at: SystemTime::now(),
                path,
            },
        );
        Ok(())
    }

    /// Number of entries currently indexed.
    pub fn len(&self) -> usize {
        self.index.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of all indexed entry sizes.
    pub fn total_bytes(&self) -> u64 {
        self.index.lock().unwrap().values().map(|e| e.size).sum()
    }

    fn load_existing(&self) {
        let mut index = self.index.lock().unwrap();
        let entries = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(err) => {
                warn!(dir = %self.dir.display(), error = %err, "cache: scan existing files failed");
                return;
            }
        };
        for dir_entry in entries.flatten() {
            let path = dir_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FILE_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(meta) = dir_entry.metadata() else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let accessed_at = meta.modified().unwrap_or_else(|_| SystemTime::now());
            index.insert(
                stem.to_string(),
                Entry {
                    size: meta.len(),
                    accessed_at,
                    path,
                },
            );
        }
        if !index.is_empty() {
            let total: u64 = index.values().map(|e| e.size).sum();
            info!(count = index.len(), total_bytes = total, "loaded existing cache entries");
            // The cap may have been reduced since the last run.
            evict(&mut index, self.max_bytes, 0);
        }
    }
}

fn entry_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.{FILE_EXT}"))
}

/// Removes least-recently-accessed entries until `total + needed` fits under
/// `max_bytes`, stopping early if the index empties. Must be called with the
/// index lock held.
fn evict(index: &mut HashMap<String, Entry>, max_bytes: u64, needed: u64) {
    let mut total: u64 = index.values().map(|e| e.size).sum();
    while total + needed > max_bytes {
        let Some(oldest) = index
            .iter()
            .min_by_key(|(_, e)| e.accessed_at)
            .map(|(k, _)| k.clone())
        else {
            break;
        };
        if let Some(entry) = index.remove(&oldest) {
            let _ = fs::remove_file(&entry.path);
            total -= entry.size;
            debug!(key = %oldest, size = entry.size, "evicted cache entry");
        }
    }
}
