use bytes::Bytes;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use super::types::{CacheKey, CacheLookup};
use crate::utils::Result;

const PARTIAL_PREFIX: &str = ".partial-";

/// Content-addressed response store: one file per key, age from mtime
#[derive(Debug, Clone)]
pub struct FileCache {
    cache_dir: PathBuf,
}

impl FileCache {
    /// Create a new file cache
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        // Ensure cache directory exists
        fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    pub fn cache_dir(&self) -> &std::path::Path {
        &self.cache_dir
    }

    /// Store `bytes` under `key`. Readers see the old entry or the new one,
    /// never a partial write.
    pub fn put(&self, key: &CacheKey, bytes: &[u8]) -> Result<()> {
        let mut partial = tempfile::Builder::new()
            .prefix(PARTIAL_PREFIX)
            .tempfile_in(&self.cache_dir)?;
        partial.write_all(bytes)?;
        partial.as_file().sync_all()?;
        partial
            .persist(self.cache_path(key))
            .map_err(|e| e.error)?;

        tracing::debug!("cached {} bytes under {}", bytes.len(), key);
        Ok(())
    }

    /// Load an entry and its age in whole seconds
    pub fn get(&self, key: &CacheKey) -> Result<CacheLookup> {
        let cache_path = self.cache_path(key);

        let modified = match fs::metadata(&cache_path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(CacheLookup::Absent),
            Err(e) => return Err(e.into()),
        };

        // a sweep may delete the file between the stat and the read
        let bytes = match fs::read(&cache_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(CacheLookup::Absent),
            Err(e) => return Err(e.into()),
        };

        Ok(CacheLookup::Hit {
            bytes: Bytes::from(bytes),
            age_secs: age_of(modified).as_secs(),
        })
    }

    /// Delete every entry older than `max_age`, returning how many went.
    ///
    /// An entry refreshed between the scan and the delete is lost; that
    /// costs one extra cache miss.
    pub fn sweep(&self, max_age: Duration) -> Result<usize> {
        let max_age_secs = max_age.as_secs();
        let mut removed = 0;

        for entry in fs::read_dir(&self.cache_dir)? {
            let Ok(entry) = entry else { continue };
            let Ok(metadata) = entry.metadata() else { continue };
            if !metadata.is_file() {
                continue;
            }
            let Ok(modified) = metadata.modified() else { continue };

            if age_of(modified).as_secs() > max_age_secs && fs::remove_file(entry.path()).is_ok() {
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!(
                "swept {} cache entries older than {}s from {}",
                removed,
                max_age_secs,
                self.cache_dir.display()
            );
        }
        Ok(removed)
    }

    fn cache_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(key.as_str())
    }
}

fn age_of(modified: SystemTime) -> Duration {
    // clock skew can put mtime in the future; treat that as brand new
    SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{LogicalPath, PromptAnswers};
    use tempfile::TempDir;

    fn key(name: &str) -> CacheKey {
        CacheKey::derive(&LogicalPath::parse(name), &PromptAnswers::new())
    }

    fn backdate(cache: &FileCache, key: &CacheKey, secs: u64) {
        let file = fs::File::options()
            .write(true)
            .open(cache.cache_path(key))
            .unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn test_put_then_get() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileCache::new(temp_dir.path().join("cache")).unwrap();
        let k = key("dsn/public/Roster");

        cache.put(&k, b"a,b\n1,2\n").unwrap();
        assert_eq!(
            cache.get(&k).unwrap(),
            CacheLookup::Hit {
                bytes: Bytes::from_static(b"a,b\n1,2\n"),
                age_secs: 0
            }
        );

        // overwrite replaces and resets the age
        backdate(&cache, &k, 100);
        cache.put(&k, b"new").unwrap();
        assert_eq!(
            cache.get(&k).unwrap(),
            CacheLookup::Hit {
                bytes: Bytes::from_static(b"new"),
                age_secs: 0
            }
        );
    }

    #[test]
    fn test_get_absent() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileCache::new(temp_dir.path().to_path_buf()).unwrap();
        let lookup = cache.get(&key("dsn/public/Missing")).unwrap();
        assert_eq!(lookup, CacheLookup::Absent);
        assert_eq!(lookup.age_secs(), -1);
    }

    #[test]
    fn test_put_leaves_no_partial_files() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileCache::new(temp_dir.path().to_path_buf()).unwrap();
        let k = key("dsn/public/Roster");
        cache.put(&k, b"data").unwrap();

        let names: Vec<String> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![k.to_string()]);
    }

    #[test]
    fn test_sweep_boundary() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileCache::new(temp_dir.path().to_path_buf()).unwrap();

        let fresh = key("dsn/public/Fresh");
        let edge = key("dsn/public/Edge");
        let old = key("dsn/public/Old");
        for k in [&fresh, &edge, &old] {
            cache.put(k, b"x").unwrap();
        }
        backdate(&cache, &edge, 50);
        backdate(&cache, &old, 120);

        let removed = cache.sweep(Duration::from_secs(60)).unwrap();
        assert_eq!(removed, 1);
        assert!(matches!(cache.get(&fresh).unwrap(), CacheLookup::Hit { .. }));
        assert!(matches!(cache.get(&edge).unwrap(), CacheLookup::Hit { .. }));
        assert_eq!(cache.get(&old).unwrap(), CacheLookup::Absent);
    }
}
