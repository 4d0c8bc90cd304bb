//! Ingestion cache: a durable key→bytes store scoped to a bundle.
//!
//! Ingest routines park expensive intermediates here (downloaded archives,
//! parsed tables) so a failed run can resume without repeating them. The
//! coordinator clears the cache only after a successful commit — a failed
//! run leaves every entry in place.

use crate::error::StoreError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Entry files are named by the blake3 digest of the key, with a `.key`
/// sidecar holding the key string for listings.
pub struct IngestionCache {
    dir: PathBuf,
}

impl IngestionCache {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| StoreError::CacheError(format!("failed to create cache dir: {e}")))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.bin", blake3::hash(key.as_bytes()).to_hex()))
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        fs::read(&path)
            .map(Some)
            .map_err(|e| StoreError::CacheError(format!("read '{key}': {e}")))
    }

    pub fn put(&self, key: &str, payload: &[u8]) -> Result<(), StoreError> {
        let path = self.entry_path(key);
        let tmp_path = path.with_extension("bin.tmp");
        fs::write(&tmp_path, payload)
            .map_err(|e| StoreError::CacheError(format!("write '{key}': {e}")))?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::CacheError(format!("atomic rename for '{key}': {e}"))
        })?;
        fs::write(path.with_extension("key"), key)
            .map_err(|e| StoreError::CacheError(format!("key sidecar for '{key}': {e}")))?;
        Ok(())
    }

    /// Remove every entry. Only the coordinator's commit path calls this.
    pub fn clear(&self) -> Result<(), StoreError> {
        for entry in fs::read_dir(&self.dir)
            .map_err(|e| StoreError::CacheError(format!("read cache dir: {e}")))?
        {
            let entry = entry.map_err(|e| StoreError::CacheError(format!("dir entry: {e}")))?;
            let path = entry.path();
            if path.is_file() {
                fs::remove_file(&path)
                    .map_err(|e| StoreError::CacheError(format!("remove entry: {e}")))?;
            }
        }
        debug!(dir = %self.dir.display(), "ingestion cache cleared");
        Ok(())
    }

    /// Keys of all entries, sorted. For inspection and progress reporting.
    pub fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .map_err(|e| StoreError::CacheError(format!("read cache dir: {e}")))?
        {
            let entry = entry.map_err(|e| StoreError::CacheError(format!("dir entry: {e}")))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("key") {
                let key = fs::read_to_string(&path)
                    .map_err(|e| StoreError::CacheError(format!("read key sidecar: {e}")))?;
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.keys()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = env::temp_dir().join(format!("barvault_cache_{}_{id}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn put_get_roundtrip() {
        let dir = temp_dir();
        let cache = IngestionCache::open(&dir).unwrap();

        assert_eq!(cache.get("raw/spy.csv").unwrap(), None);
        cache.put("raw/spy.csv", b"date,open,close").unwrap();
        assert_eq!(
            cache.get("raw/spy.csv").unwrap().as_deref(),
            Some(b"date,open,close".as_slice())
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn put_overwrites_existing_key() {
        let dir = temp_dir();
        let cache = IngestionCache::open(&dir).unwrap();

        cache.put("k", b"v1").unwrap();
        cache.put("k", b"v2").unwrap();
        assert_eq!(cache.get("k").unwrap().as_deref(), Some(b"v2".as_slice()));
        assert_eq!(cache.len().unwrap(), 1);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn clear_removes_everything() {
        let dir = temp_dir();
        let cache = IngestionCache::open(&dir).unwrap();

        cache.put("a", b"1").unwrap();
        cache.put("b", b"2").unwrap();
        assert_eq!(cache.len().unwrap(), 2);

        cache.clear().unwrap();
        assert!(cache.is_empty().unwrap());
        assert_eq!(cache.get("a").unwrap(), None);
        assert_eq!(cache.get("b").unwrap(), None);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn keys_are_listed_sorted() {
        let dir = temp_dir();
        let cache = IngestionCache::open(&dir).unwrap();

        cache.put("zeta", b"1").unwrap();
        cache.put("alpha", b"2").unwrap();
        assert_eq!(cache.keys().unwrap(), vec!["alpha", "zeta"]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn reopening_sees_existing_entries() {
        let dir = temp_dir();
        {
            let cache = IngestionCache::open(&dir).unwrap();
            cache.put("persist", b"payload").unwrap();
        }
        let cache = IngestionCache::open(&dir).unwrap();
        assert_eq!(
            cache.get("persist").unwrap().as_deref(),
            Some(b"payload".as_slice())
        );

        let _ = fs::remove_dir_all(&dir);
    }
}
