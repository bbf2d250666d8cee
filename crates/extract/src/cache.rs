use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

/// Key-value store for raw extraction text, keyed by chunk content hash.
///
/// Callers treat errors from either method as a miss or a skipped write.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn put(&self, key: &str, value: &str) -> Result<()>;
}

pub struct MemoryCache {
    entries: Arc<DashMap<String, String>>,
    max_entries: usize,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|r| r.value().clone()))
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(key) {
            // Clear 25% when full
            let to_remove: Vec<_> = self
                .entries
                .iter()
                .take((self.max_entries / 4).max(1))
                .map(|r| r.key().clone())
                .collect();
            for k in to_remove {
                self.entries.remove(&k);
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One file per key under a directory. Writes go through a temp file and a
/// rename so readers never observe a partial entry.
pub struct FileCache {
    dir: PathBuf,
    tmp_counter: AtomicU64,
}

impl FileCache {
    pub async fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .await
            .context(format!("Failed to create cache directory: {:?}", dir))?;

        Ok(Self {
            dir,
            tmp_counter: AtomicU64::new(0),
        })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.txt"))
    }
}

#[async_trait]
impl CacheStore for FileCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.entry_path(key);
        match fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context(format!("Failed to read cache entry: {:?}", path)),
        }
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let path = self.entry_path(key);
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = self.dir.join(format!(".{key}.{}.{n}.tmp", std::process::id()));

        fs::write(&tmp, value)
            .await
            .context(format!("Failed to write cache entry: {:?}", tmp))?;
        fs::rename(&tmp, &path)
            .await
            .context(format!("Failed to commit cache entry: {:?}", path))?;
        Ok(())
    }
}

/// Never hits, never stores.
pub struct NoopCache;

#[async_trait]
impl CacheStore for NoopCache {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn put(&self, _key: &str, _value: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total > 0 {
            self.hits as f64 / total as f64
        } else {
            0.0
        }
    }
}
