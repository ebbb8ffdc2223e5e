//! Content-addressed cover-art disk cache (§3, §4.G, §6).
//!
//! Files are named by cover ID with no extension; a cache file's mtime is
//! forced equal to its source's mtime at write time, so a later scan can
//! tell staleness from a single `metadata()` call on each side.
//!
//! Grounded on the teacher's `cover/cache.rs` (directory-backed
//! get/put/contains shape), re-keyed from MusicBrainz release ID + guessed
//! extension to cover ID with no extension, and mtime-forcing added since
//! the teacher never needed staleness detection for a cache it never
//! invalidated.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::SystemTime;

pub struct CoverCache {
    cache_dir: PathBuf,
}

impl CoverCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_path(&self, cover_id: &str) -> PathBuf {
        self.cache_dir.join(cover_id)
    }

    /// Read cached bytes + the cache file's last-write time, if present.
    pub fn get(&self, cover_id: &str) -> Option<(Vec<u8>, SystemTime)> {
        let path = self.cache_path(cover_id);
        let data = fs::read(&path).ok()?;
        let modified = fs::metadata(&path).ok()?.modified().ok()?;
        Some((data, modified))
    }

    /// True if a cache file exists and its mtime is not older than
    /// `source_modified` (§3 staleness rule).
    pub fn is_fresh(&self, cover_id: &str, source_modified: SystemTime) -> bool {
        fs::metadata(self.cache_path(cover_id))
            .and_then(|m| m.modified())
            .is_ok_and(|cached| cached >= source_modified)
    }

    /// Write `data` to the cache and force the resulting file's mtime to
    /// `source_modified`.
    pub fn put(
        &self,
        cover_id: &str,
        data: &[u8],
        source_modified: SystemTime,
    ) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.cache_dir)?;
        let path = self.cache_path(cover_id);
        fs::write(&path, data)?;
        let file = fs::OpenOptions::new().write(true).open(&path)?;
        file.set_modified(source_modified)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn put_then_get_round_trips_bytes() {
        let temp = TempDir::new().unwrap();
        let cache = CoverCache::new(temp.path());
        let now = SystemTime::now();

        cache.put("abc123", b"fake jpeg data", now).unwrap();
        let (data, _) = cache.get("abc123").unwrap();
        assert_eq!(data, b"fake jpeg data");
    }

    #[test]
    fn put_forces_mtime_to_source() {
        let temp = TempDir::new().unwrap();
        let cache = CoverCache::new(temp.path());
        let source_mtime = SystemTime::now() - Duration::from_secs(3600);

        cache.put("abc123", b"data", source_mtime).unwrap();
        let (_, cached_mtime) = cache.get("abc123").unwrap();
        let delta = cached_mtime
            .duration_since(source_mtime)
            .unwrap_or_default();
        assert!(delta < Duration::from_secs(1));
    }

    #[test]
    fn is_fresh_true_when_cache_not_older_than_source() {
        let temp = TempDir::new().unwrap();
        let cache = CoverCache::new(temp.path());
        let source_mtime = SystemTime::now();

        cache.put("id", b"data", source_mtime).unwrap();
        assert!(cache.is_fresh("id", source_mtime));
    }

    #[test]
    fn is_fresh_false_when_source_is_newer() {
        let temp = TempDir::new().unwrap();
        let cache = CoverCache::new(temp.path());
        let old_source_mtime = SystemTime::now() - Duration::from_secs(3600);

        cache.put("id", b"data", old_source_mtime).unwrap();
        let new_source_mtime = SystemTime::now();
        assert!(!cache.is_fresh("id", new_source_mtime));
    }

    #[test]
    fn is_fresh_false_when_missing() {
        let temp = TempDir::new().unwrap();
        let cache = CoverCache::new(temp.path());
        assert!(!cache.is_fresh("missing", SystemTime::now()));
    }

    #[test]
    fn get_missing_returns_none() {
        let temp = TempDir::new().unwrap();
        let cache = CoverCache::new(temp.path());
        assert!(cache.get("missing").is_none());
    }
}
