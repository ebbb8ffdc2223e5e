//! Cover source resolution: embedded tag picture wins over a sidecar file
//! when both exist (§3 tie-break rule).
//!
//! Grounded on the teacher's `cover/resolver.rs` priority-chain shape
//! (embedded, then sidecar, then cache, then remote); the remote-fetch tier
//! has no counterpart in the spec and is dropped.

use std::path::{Path, PathBuf};

use super::{embedded, sidecar};

/// A resolved cover source: where the bytes came from and the bytes
/// themselves, ready to be written into the cache.
pub struct CoverSourceData {
    pub is_embedded: bool,
    /// Absolute path of the embedded audio file or the sidecar image.
    pub source_path: PathBuf,
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Resolve a song's cover art source. `audio_path` must be absolute.
pub fn resolve_source(audio_path: &Path) -> Option<CoverSourceData> {
    if let Some((data, content_type)) = embedded::extract(audio_path) {
        return Some(CoverSourceData {
            is_embedded: true,
            source_path: audio_path.to_path_buf(),
            data,
            content_type,
        });
    }

    let sidecar_path = sidecar::find(audio_path)?;
    let data = std::fs::read(&sidecar_path).ok()?;
    let content_type = super::sniff_content_type(&data).to_string();
    Some(CoverSourceData {
        is_embedded: false,
        source_path: sidecar_path,
        data,
        content_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn falls_back_to_sidecar_when_no_embedded_picture() {
        let temp = TempDir::new().unwrap();
        let audio_path = temp.path().join("track.mp3");
        std::fs::write(&audio_path, b"fake audio, not a real mp3").unwrap();
        std::fs::write(temp.path().join("cover.jpg"), [0xFF, 0xD8, 0xFF, 0x00]).unwrap();

        let resolved = resolve_source(&audio_path).unwrap();
        assert!(!resolved.is_embedded);
        assert_eq!(resolved.content_type, "image/jpeg");
    }

    #[test]
    fn returns_none_when_no_source_available() {
        let temp = TempDir::new().unwrap();
        let audio_path = temp.path().join("track.mp3");
        std::fs::write(&audio_path, b"fake audio").unwrap();

        assert!(resolve_source(&audio_path).is_none());
    }
}
