//! Cover art resolution and caching (§4.G).
//!
//! Resolution order during scan: embedded tag picture, then a sidecar image
//! file; embedded wins when both are present. Resolved bytes are written
//! into a content-addressed cache directory keyed by cover ID, with the
//! cache file's mtime forced to the source's mtime so a later scan can tell
//! whether the cache is stale without re-reading the source.
//!
//! Grounded on the teacher's four-file split (`embedded`, `sidecar`,
//! `cache`, `resolver`), narrowed from the teacher's MusicBrainz-release-ID
//! cache key and network-fetch fallback to the spec's pure
//! embedded/sidecar/cache scheme.

mod cache;
mod embedded;
mod resolver;
mod sidecar;

use std::time::SystemTime;

use crate::error::{Error, Result};
use crate::model::CoverArt;

pub use cache::CoverCache;
pub use resolver::{resolve_source, CoverSourceData};

/// `GetCoverArt` resolution (§4.G): prefer the disk cache, falling back to
/// re-reading the source (embedded picture or sidecar file) on a cache miss.
/// Returns `(bytes, last_modified, content_type)`; any failure along the way
/// collapses to `NotFound` per §4.G step 4.
pub fn get(cover_art: &CoverArt, cache: &CoverCache) -> Result<(Vec<u8>, SystemTime, String)> {
    if let Some((data, last_modified)) = cache.get(&cover_art.id) {
        let content_type = sniff_content_type(&data).to_string();
        return Ok((data, last_modified, content_type));
    }

    let not_found = || Error::not_found(format!("cover:{}", cover_art.id));

    let (data, content_type) = if cover_art.is_embedded {
        embedded::extract(&cover_art.source_path).ok_or_else(not_found)?
    } else {
        let data = std::fs::read(&cover_art.source_path).map_err(|_| not_found())?;
        let content_type = sniff_content_type(&data).to_string();
        (data, content_type)
    };
    Ok((data, cover_art.source_modified, content_type))
}

/// Conditional-request helper for the adapters' `If-Modified-Since` support
/// (§4.G): true when the cached representation is not newer than the
/// client's last-known timestamp, i.e. a `304 Not Modified` is appropriate.
pub fn is_not_modified(if_modified_since: SystemTime, last_modified: SystemTime) -> bool {
    if_modified_since >= last_modified
}

/// Sniff PNG/JPEG magic bytes; anything else defaults to `image/jpeg`
/// (spec §9 Open Question: preserved byte-for-byte, including the
/// not-actually-JPEG default for other formats).
pub fn sniff_content_type(bytes: &[u8]) -> &'static str {
    const PNG_MAGIC: [u8; 4] = [0x89, 0x50, 0x4E, 0x47];
    const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];

    if bytes.starts_with(&PNG_MAGIC) {
        "image/png"
    } else if bytes.starts_with(&JPEG_MAGIC) {
        "image/jpeg"
    } else {
        "image/jpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_png_magic() {
        let bytes = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A];
        assert_eq!(sniff_content_type(&bytes), "image/png");
    }

    #[test]
    fn sniffs_jpeg_magic() {
        let bytes = [0xFF, 0xD8, 0xFF, 0xE0];
        assert_eq!(sniff_content_type(&bytes), "image/jpeg");
    }

    #[test]
    fn unknown_bytes_default_to_jpeg() {
        let bytes = [0x00, 0x01, 0x02];
        assert_eq!(sniff_content_type(&bytes), "image/jpeg");
    }

    #[test]
    fn get_prefers_cache_over_source() {
        let temp = tempfile::TempDir::new().unwrap();
        let cache = CoverCache::new(temp.path().join("cache"));
        let now = SystemTime::now();
        cache.put("abc", &[0xFF, 0xD8, 0xFF], now).unwrap();

        let cover_art = CoverArt {
            id: "abc".to_string(),
            source_path: temp.path().join("missing-source.jpg"),
            is_embedded: false,
            source_modified: now,
            cache_path: cache.cache_path("abc"),
        };

        let (data, _, content_type) = get(&cover_art, &cache).unwrap();
        assert_eq!(data, vec![0xFF, 0xD8, 0xFF]);
        assert_eq!(content_type, "image/jpeg");
    }

    #[test]
    fn get_falls_back_to_source_on_cache_miss() {
        let temp = tempfile::TempDir::new().unwrap();
        let cache = CoverCache::new(temp.path().join("cache"));
        let source_path = temp.path().join("cover.png");
        std::fs::write(&source_path, [0x89, 0x50, 0x4E, 0x47]).unwrap();

        let cover_art = CoverArt {
            id: "xyz".to_string(),
            source_path: source_path.clone(),
            is_embedded: false,
            source_modified: SystemTime::now(),
            cache_path: cache.cache_path("xyz"),
        };

        let (data, _, content_type) = get(&cover_art, &cache).unwrap();
        assert_eq!(data, vec![0x89, 0x50, 0x4E, 0x47]);
        assert_eq!(content_type, "image/png");
    }

    #[test]
    fn get_fails_not_found_when_nothing_available() {
        let temp = tempfile::TempDir::new().unwrap();
        let cache = CoverCache::new(temp.path().join("cache"));
        let cover_art = CoverArt {
            id: "gone".to_string(),
            source_path: temp.path().join("nope.jpg"),
            is_embedded: false,
            source_modified: SystemTime::now(),
            cache_path: cache.cache_path("gone"),
        };
        assert!(get(&cover_art, &cache).is_err());
    }

    #[test]
    fn not_modified_when_client_timestamp_is_current() {
        let now = SystemTime::now();
        assert!(is_not_modified(now, now));
        assert!(!is_not_modified(
            now - std::time::Duration::from_secs(10),
            now
        ));
    }
}
