//! Audio tag reading (§4.A).
//!
//! Uses `lofty` for format-independent metadata access across MP3, FLAC,
//! OGG, M4A, WAV, and the other suffixes §6 enumerates.
//!
//! Grounded on the teacher's `metadata/mod.rs` (`Probe::open(..).read()`,
//! primary-tag-or-first-tag fallback), generalized from a 5-field
//! `TrackMetadata` into the full `ParsedSong` record the scanner needs:
//! ReplayGain, ISRC, embedded lyrics text, and an embedded-picture flag.

use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, Tag};
use std::path::Path;

use crate::model::ReplayGain;

/// Everything the tag reader can learn about one audio file, short of the
/// catalog IDs that get derived once the song's place in the tree is known.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSong {
    pub title: String,
    pub album: String,
    pub album_artist: String,
    pub artist: String,
    pub genre: Option<String>,
    pub track_number: Option<u32>,
    pub year: Option<i32>,
    pub duration_secs: u64,
    pub bitrate_kbps: Option<u32>,
    pub isrc: Option<String>,
    pub replay_gain: ReplayGain,
    pub embedded_lyrics: Option<String>,
    pub has_embedded_picture: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum TagError {
    #[error("unreadable file: {0}")]
    Unreadable(#[from] std::io::Error),
    #[error("unparseable tags: {0}")]
    Unparseable(String),
}

/// Read tags from one audio file. Failures are always non-fatal to a scan —
/// the caller skips the file and moves on (§4.A, §7).
pub fn read(path: &Path) -> Result<ParsedSong, TagError> {
    let tagged_file = Probe::open(path)
        .map_err(|e| TagError::Unparseable(e.to_string()))?
        .read()
        .map_err(|e| TagError::Unparseable(e.to_string()))?;

    let tag = tagged_file.primary_tag().or_else(|| tagged_file.first_tag());

    let title = tag
        .and_then(|t| t.title().map(|s| s.to_string()))
        .unwrap_or_default();
    let artist = tag
        .and_then(|t| t.artist().map(|s| s.to_string()))
        .unwrap_or_default();
    let album = tag
        .and_then(|t| t.album().map(|s| s.to_string()))
        .unwrap_or_default();
    let album_artist = tag
        .and_then(|t| t.get_string(&ItemKey::AlbumArtist).map(|s| s.to_string()))
        .unwrap_or_else(|| artist.clone());
    let genre = tag.and_then(|t| t.genre().map(|s| s.to_string()));
    let track_number = tag.and_then(|t| t.track());
    let year = tag.and_then(|t| t.year()).map(|y| y as i32);
    let isrc = tag.and_then(|t| t.get_string(&ItemKey::Isrc).map(|s| s.to_string()));
    let embedded_lyrics = tag.and_then(|t| t.get_string(&ItemKey::Lyrics).map(|s| s.to_string()));
    let has_embedded_picture = tag.is_some_and(|t| !t.pictures().is_empty());
    let replay_gain = tag.map(read_replay_gain).unwrap_or_default();

    let properties = tagged_file.properties();
    let duration_secs = properties.duration().as_secs();
    let bitrate_kbps = properties.audio_bitrate();

    Ok(ParsedSong {
        title,
        album,
        album_artist,
        artist,
        genre,
        track_number,
        year,
        duration_secs,
        bitrate_kbps,
        isrc,
        replay_gain,
        embedded_lyrics,
        has_embedded_picture,
    })
}

/// Suffix (lowercase, no dot) and MIME content type for a song's delivery
/// response, per the §6 format table. Unknown suffixes fall back to a
/// generic binary content type rather than failing the scan.
pub fn suffix_and_content_type(path: &Path) -> (String, String) {
    let suffix = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_lowercase();

    let content_type = match suffix.as_str() {
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        "opus" => "audio/opus",
        "wav" => "audio/wav",
        "aac" => "audio/aac",
        "wma" => "audio/x-ms-wma",
        _ => "application/octet-stream",
    };

    (suffix, content_type.to_string())
}

/// The external lyrics sidecar for an audio file: same basename, `.lrc`
/// extension, sitting next to it (§4.D). `None` if no such file exists.
pub fn find_external_lyrics(audio_path: &Path) -> Option<std::path::PathBuf> {
    let candidate = audio_path.with_extension("lrc");
    candidate.is_file().then_some(candidate)
}

/// Parses `REPLAYGAIN_*`/`TXXX:REPLAYGAIN_*`/`----:com.apple.iTunes:replaygain_*`
/// values, all of which lofty normalizes to the same `ItemKey` variants
/// regardless of container format (§4.A).
fn read_replay_gain(tag: &Tag) -> ReplayGain {
    ReplayGain {
        track_gain_db: tag
            .get_string(&ItemKey::ReplayGainTrackGain)
            .and_then(parse_gain_db),
        track_peak: tag
            .get_string(&ItemKey::ReplayGainTrackPeak)
            .and_then(parse_peak),
        album_gain_db: tag
            .get_string(&ItemKey::ReplayGainAlbumGain)
            .and_then(parse_gain_db),
        album_peak: tag
            .get_string(&ItemKey::ReplayGainAlbumPeak)
            .and_then(parse_peak),
    }
}

/// `"-8.50 dB"` → `-8.5`.
fn parse_gain_db(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let numeric = trimmed
        .strip_suffix("dB")
        .or_else(|| trimmed.strip_suffix("DB"))
        .or_else(|| trimmed.strip_suffix("db"))
        .unwrap_or(trimmed);
    numeric.trim().parse::<f64>().ok()
}

/// `"0.950000"` → `0.95`.
fn parse_peak(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_gain_db_strips_unit_suffix() {
        assert_eq!(parse_gain_db("-8.50 dB"), Some(-8.5));
        assert_eq!(parse_gain_db("3.2dB"), Some(3.2));
    }

    #[test]
    fn parse_gain_db_rejects_garbage() {
        assert_eq!(parse_gain_db("not a number"), None);
    }

    #[test]
    fn parse_peak_parses_plain_float() {
        assert_eq!(parse_peak("0.950000"), Some(0.95));
    }

    #[test]
    fn suffix_and_content_type_maps_known_formats() {
        assert_eq!(
            suffix_and_content_type(Path::new("song.MP3")),
            ("mp3".to_string(), "audio/mpeg".to_string())
        );
        assert_eq!(
            suffix_and_content_type(Path::new("song.flac")),
            ("flac".to_string(), "audio/flac".to_string())
        );
    }

    #[test]
    fn suffix_and_content_type_falls_back_for_unknown_extension() {
        assert_eq!(
            suffix_and_content_type(Path::new("song.xyz")),
            ("xyz".to_string(), "application/octet-stream".to_string())
        );
    }

    #[test]
    fn find_external_lyrics_finds_sibling_lrc() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("song.mp3");
        std::fs::write(&audio, b"").unwrap();
        std::fs::write(dir.path().join("song.lrc"), b"[00:01.00]hi").unwrap();
        assert_eq!(find_external_lyrics(&audio), Some(dir.path().join("song.lrc")));
    }

    #[test]
    fn find_external_lyrics_none_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("song.mp3");
        std::fs::write(&audio, b"").unwrap();
        assert_eq!(find_external_lyrics(&audio), None);
    }

    #[test]
    fn read_non_existent_file_returns_error() {
        let path = Path::new("non_existent_file.mp3");
        assert!(read(path).is_err());
    }

    #[test]
    fn read_non_audio_file_returns_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"not an audio file").unwrap();
        assert!(read(file.path()).is_err());
    }
}
