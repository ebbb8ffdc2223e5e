//! Persistent scan record (§4.C).
//!
//! A single JSON file holding just enough per-file state that an unchanged
//! tree never needs its audio tags re-read. Rewritten atomically
//! (write-temp-then-rename) at the end of every successful scan; absent or
//! corrupt on load is treated as an empty prior scan (full rescan), never a
//! hard error.
//!
//! Grounded on the teacher's `config.rs` atomic-write shape (`serde` +
//! temp-file + rename), carried over to `serde_json` instead of `toml`
//! since the schema is a list of per-file records rather than a settings
//! tree. The teacher's `sqlx`-backed `db` module is not reused here: the
//! spec names one flat file rewritten wholesale per scan, not a row store
//! with incremental updates (see DESIGN.md).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::model::ReplayGain;

pub fn system_time_to_iso8601(t: SystemTime) -> String {
    DateTime::<Utc>::from(t).to_rfc3339()
}

pub fn iso8601_to_system_time(s: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.into())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanRecord {
    pub songs: Vec<ScanRecordSong>,
    pub playlists: Vec<ScanRecordPlaylist>,
    pub missing_playlist_items: Vec<MissingPlaylistItemRecord>,
    pub invalid_playlists: Vec<InvalidPlaylistRecord>,
}

/// Per-file state: exactly enough to decide "reuse" vs. "reparse" plus the
/// fields needed to rebuild a `Song` without touching the file again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecordSong {
    pub relative_path: PathBuf,
    pub size_bytes: u64,
    pub created: String,
    pub modified: String,
    pub title: String,
    pub album: String,
    pub artist: String,
    pub album_artist: String,
    pub genre: Option<String>,
    /// 0 = unknown, per spec §4.C.
    pub year: i32,
    /// 0 = unknown, per spec §4.C.
    pub track: u32,
    pub duration_secs: u64,
    pub bitrate_kbps: Option<u32>,
    pub embedded_lyrics: Option<String>,
    pub external_lyrics_path: Option<PathBuf>,
    pub has_embedded_cover: bool,
    pub external_cover_path: Option<PathBuf>,
    pub isrc: Option<String>,
    pub replay_gain: ReplayGain,
}

impl ScanRecordSong {
    /// Whether this record is still valid for `size`/`modified` observed on
    /// disk — if so, the scanner reuses it instead of re-reading tags.
    pub fn matches(&self, size_bytes: u64, modified: SystemTime) -> bool {
        self.size_bytes == size_bytes && self.modified == system_time_to_iso8601(modified)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecordPlaylist {
    pub relative_path: PathBuf,
    pub name: String,
    pub comment: Option<String>,
    pub entries: Vec<ScanRecordPlaylistEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecordPlaylistEntry {
    pub relative_path: PathBuf,
    pub added_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingPlaylistItemRecord {
    pub playlist_name: String,
    pub playlist_relative_path: PathBuf,
    pub relative_path: PathBuf,
    pub added_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidPlaylistRecord {
    pub relative_path: PathBuf,
    pub reason: String,
}

/// Load the scan record at `path`. Missing or corrupt files are treated as
/// an empty prior scan, not an error — the scanner falls back to a full
/// rescan either way.
pub fn load(path: &Path) -> ScanRecord {
    if !path.exists() {
        tracing::info!("no prior scan record at {:?}, starting fresh", path);
        return ScanRecord::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("scan record at {:?} is corrupt ({}), starting fresh", path, e);
                ScanRecord::default()
            }
        },
        Err(e) => {
            tracing::warn!("failed to read scan record at {:?} ({}), starting fresh", path, e);
            ScanRecord::default()
        }
    }
}

/// Persist the scan record atomically: write to a temp file beside `path`,
/// then rename over it.
pub fn save(path: &Path, record: &ScanRecord) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(record)?;
    let temp_path = path.with_extension("json.tmp");
    std::fs::write(&temp_path, contents)?;
    std::fs::rename(&temp_path, path)?;
    tracing::info!("persisted scan record to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_song() -> ScanRecordSong {
        ScanRecordSong {
            relative_path: PathBuf::from("a.mp3"),
            size_bytes: 1234,
            created: system_time_to_iso8601(SystemTime::now()),
            modified: system_time_to_iso8601(SystemTime::now()),
            title: "Title".into(),
            album: "Album".into(),
            artist: "Artist".into(),
            album_artist: "Artist".into(),
            genre: None,
            year: 0,
            track: 0,
            duration_secs: 180,
            bitrate_kbps: Some(320),
            embedded_lyrics: None,
            external_lyrics_path: None,
            has_embedded_cover: false,
            external_cover_path: None,
            isrc: None,
            replay_gain: ReplayGain::default(),
        }
    }

    #[test]
    fn missing_file_yields_empty_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scan.json");
        let record = load(&path);
        assert!(record.songs.is_empty());
    }

    #[test]
    fn corrupt_file_yields_empty_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scan.json");
        std::fs::write(&path, b"not json at all {{{").unwrap();
        let record = load(&path);
        assert!(record.songs.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scan.json");

        let mut record = ScanRecord::default();
        record.songs.push(sample_song());

        save(&path, &record).unwrap();
        let loaded = load(&path);

        assert_eq!(loaded.songs.len(), 1);
        assert_eq!(loaded.songs[0].title, "Title");
    }

    #[test]
    fn matches_checks_size_and_modified() {
        let song = sample_song();
        let modified = iso8601_to_system_time(&song.modified).unwrap();
        assert!(song.matches(song.size_bytes, modified));
        assert!(!song.matches(song.size_bytes + 1, modified));
    }

    #[test]
    fn save_is_atomic_no_tmp_file_left_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scan.json");
        save(&path, &ScanRecord::default()).unwrap();
        assert!(!path.with_extension("json.tmp").exists());
        assert!(path.exists());
    }
}
