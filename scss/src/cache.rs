//! Content-hash keyed store for parsed trees and compile results.
//!
//! Entries are opaque JSON strings. A key is the SHA-256 of the crate
//! version, the operation name, the caller's key and an options
//! fingerprint, so changing any of them yields a miss rather than a stale hit.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use tracing::debug;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const EXTENSION: &str = "cache";

/// External key-value store used by the parser and compiler.
pub trait CacheStore: Send + Sync {
    /// Fetch an entry. When `last_modified` is given, entries written before
    /// that instant are treated as stale.
    fn get(
        &self,
        operation: &str,
        key: &str,
        options: &str,
        last_modified: Option<SystemTime>,
    ) -> Option<String>;

    fn put(&self, operation: &str, key: &str, value: &str, options: &str);
}

/// Hex SHA-256 of arbitrary content.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Storage key for an entry.
pub fn cache_key(operation: &str, key: &str, options: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [VERSION, operation, key, options] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// Configuration for [`FileCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub directory: PathBuf,
    /// File name prefix; only files carrying it are swept.
    pub prefix: String,
    /// Age after which entries are garbage collected.
    pub ttl: Duration,
    /// Re-check the modification times of imported files before trusting a
    /// cached compile result.
    pub check_import_resolutions: bool,
}

impl CacheConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        CacheConfig {
            directory: directory.into(),
            prefix: "scss_".to_string(),
            ttl: Duration::from_secs(7 * 24 * 60 * 60),
            check_import_resolutions: true,
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (SystemTime, String)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        MemoryCache::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCache {
    fn get(
        &self,
        operation: &str,
        key: &str,
        options: &str,
        last_modified: Option<SystemTime>,
    ) -> Option<String> {
        let entries = self.entries.lock().ok()?;
        let (written, value) = entries.get(&cache_key(operation, key, options))?;
        if last_modified.is_some_and(|modified| *written < modified) {
            return None;
        }
        Some(value.clone())
    }

    fn put(&self, operation: &str, key: &str, value: &str, options: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                cache_key(operation, key, options),
                (SystemTime::now(), value.to_string()),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

pub struct FileCache {
    config: CacheConfig,
}

impl FileCache {
    /// Create the cache, making sure its directory exists.
    pub fn new(config: CacheConfig) -> io::Result<Self> {
        fs::create_dir_all(&config.directory)?;
        Ok(FileCache { config })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn path_for(&self, operation: &str, key: &str, options: &str) -> PathBuf {
        self.config.directory.join(format!(
            "{}{}.{}",
            self.config.prefix,
            cache_key(operation, key, options),
            EXTENSION
        ))
    }

    /// Delete entries older than the TTL. Returns how many files were removed.
    pub fn gc(&self) -> io::Result<usize> {
        let Some(cutoff) = SystemTime::now().checked_sub(self.config.ttl) else {
            return Ok(0);
        };
        let mut removed = 0;
        for entry in fs::read_dir(&self.config.directory)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(&self.config.prefix) || !name.ends_with(&format!(".{}", EXTENSION)) {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            if modified < cutoff {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        debug!(removed, directory = %self.config.directory.display(), "cache sweep");
        Ok(removed)
    }
}

impl CacheStore for FileCache {
    fn get(
        &self,
        operation: &str,
        key: &str,
        options: &str,
        last_modified: Option<SystemTime>,
    ) -> Option<String> {
        let path = self.path_for(operation, key, options);
        let written = fs::metadata(&path).and_then(|m| m.modified()).ok()?;
        if last_modified.is_some_and(|modified| written < modified) {
            debug!(path = %path.display(), "cache entry older than source");
            return None;
        }
        match fs::read_to_string(&path) {
            Ok(value) => Some(value),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "cache read failed");
                None
            }
        }
    }

    fn put(&self, operation: &str, key: &str, value: &str, options: &str) {
        let path = self.path_for(operation, key, options);
        if let Err(err) = fs::write(&path, value) {
            debug!(path = %path.display(), error = %err, "cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_depend_on_every_component() {
        let base = cache_key("parse", "a.scss", "utf8");
        assert_eq!(base, cache_key("parse", "a.scss", "utf8"));
        assert_ne!(base, cache_key("compile", "a.scss", "utf8"));
        assert_ne!(base, cache_key("parse", "b.scss", "utf8"));
        assert_ne!(base, cache_key("parse", "a.scss", ""));
        assert_eq!(base.len(), 64);
    }

    #[test]
    fn memory_cache_respects_last_modified() {
        let cache = MemoryCache::new();
        cache.put("op", "k", "v", "");
        assert_eq!(cache.get("op", "k", "", None).as_deref(), Some("v"));
        let future = SystemTime::now() + Duration::from_secs(60);
        assert_eq!(cache.get("op", "k", "", Some(future)), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn file_cache_round_trip_and_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CacheConfig::new(dir.path());
        config.prefix = "t_".into();
        let cache = FileCache::new(config.clone()).unwrap();
        cache.put("op", "k", "value", "opts");
        assert_eq!(cache.get("op", "k", "opts", None).as_deref(), Some("value"));

        fs::write(dir.path().join("unrelated.txt"), "keep").unwrap();

        // A zero TTL makes every prefixed entry stale.
        config.ttl = Duration::ZERO;
        std::thread::sleep(Duration::from_millis(20));
        let sweeper = FileCache::new(config).unwrap();
        assert_eq!(sweeper.gc().unwrap(), 1);
        assert!(cache.get("op", "k", "opts", None).is_none());
        assert!(dir.path().join("unrelated.txt").exists());
    }
}
