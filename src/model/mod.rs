//! Core catalog entities (§3).
//!
//! Entities are immutable once published inside a [`crate::catalog::CatalogSnapshot`].
//! Cross-references between entities (song → album, album → artist, ...) are
//! stored as opaque [`Id`] strings rather than raw pointers, so that a
//! snapshot can be built and shared without interior mutability — see
//! `catalog/mod.rs` for how lookups are resolved.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;

/// Every catalog ID is a lowercase-hex SHA-256 digest; see `id.rs`.
pub type Id = String;

/// A ReplayGain value pair: gain in decibels, peak as linear amplitude.
///
/// Derives `Serialize`/`Deserialize` because it is embedded in the
/// persistent scan record (§4.C); the rest of the data model stays
/// in-memory only.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ReplayGain {
    pub track_gain_db: Option<f64>,
    pub track_peak: Option<f64>,
    pub album_gain_db: Option<f64>,
    pub album_peak: Option<f64>,
}

impl ReplayGain {
    pub fn has_track_gain(&self) -> bool {
        self.track_gain_db.is_some()
    }
}

/// Where a song's lyrics come from.
#[derive(Debug, Clone, PartialEq)]
pub struct Lyrics {
    /// Relative-to-root path of the external `.lrc` file, or the audio
    /// file's own relative path when `is_embedded` is true.
    pub source_path: PathBuf,
    pub is_embedded: bool,
    /// Lyric text captured at scan time when `is_embedded`, so serving it
    /// never re-reads the audio file's tags (§4.C persists the same text in
    /// the scan record). `None` for external lyrics, which are re-read and
    /// re-parsed from the `.lrc` sidecar on every request since that file
    /// may change independently of the audio file.
    pub embedded_text: Option<String>,
}

/// Where a song's cover art comes from, and where it is cached on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverArt {
    pub id: Id,
    /// Absolute path of the audio file (when `is_embedded`) or the sidecar
    /// image file this cover was resolved from. The cover *ID* is derived
    /// from the corresponding relative path (§4.B); this field stores an
    /// absolute path because it is re-read directly on a cache miss.
    pub source_path: PathBuf,
    pub is_embedded: bool,
    pub source_modified: SystemTime,
    /// Path in the cover-art cache directory (filename is the cover ID, no
    /// extension); may not exist on disk yet.
    pub cache_path: PathBuf,
}

/// A single audio file.
#[derive(Debug, Clone)]
pub struct Song {
    pub id: Id,
    pub path: PathBuf,
    pub title: String,
    pub album: String,
    pub album_artist: String,
    pub artist: String,
    pub genre: Option<String>,
    pub track_number: Option<u32>,
    pub year: Option<i32>,
    pub duration_secs: u64,
    pub size_bytes: u64,
    pub bitrate_kbps: Option<u32>,
    pub suffix: String,
    pub content_type: String,
    pub isrc: Option<String>,
    pub replay_gain: ReplayGain,
    pub lyrics: Option<Lyrics>,
    pub cover_art: Option<CoverArt>,
    pub created: SystemTime,

    /// Resolved during catalog assembly (§4.F step 5); always `Some` for a
    /// real song once the catalog is built. Virtual songs (missing-tracks)
    /// leave these as `None`.
    pub album_id: Option<Id>,
    pub artist_id: Option<Id>,
    pub parent_id: Option<Id>,
}

/// A group of songs sharing album name + album artist.
#[derive(Debug, Clone)]
pub struct Album {
    pub id: Id,
    pub name: String,
    pub artist_name: String,
    pub artist_id: Id,
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub duration_secs: u64,
    pub song_count: usize,
    pub created: SystemTime,
    /// Song IDs, ordered by track number ascending (missing track numbers
    /// sort as if they were 0).
    pub songs: Vec<Id>,
    pub cover_art: Option<CoverArt>,
}

/// A group of albums sharing a normalized artist name.
#[derive(Debug, Clone)]
pub struct Artist {
    pub id: Id,
    pub name: String,
    pub albums: Vec<Id>,
    pub cover_art: Option<CoverArt>,
}

impl Artist {
    pub fn album_count(&self) -> usize {
        self.albums.len()
    }
}

/// A directory under the library root.
#[derive(Debug, Clone)]
pub struct Directory {
    pub id: Id,
    pub name: String,
    pub path: PathBuf,
    pub parent_id: Option<Id>,
    pub songs: Vec<Id>,
    pub children: Vec<Id>,
}

/// One entry in a playlist: a song reference plus the date it was added.
#[derive(Debug, Clone)]
pub struct PlaylistItem {
    pub song_id: Id,
    pub added_date: SystemTime,
}

/// An opaque XML extension block the writer does not own, preserved
/// byte-for-byte across edits (§4.D, §8 round-trip invariant).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignExtension {
    pub raw_xml: String,
}

/// A named, ordered list of songs, backed by an XSPF file on disk (or
/// computed, for virtual playlists — see `catalog::virtual_playlists`).
#[derive(Debug, Clone)]
pub struct Playlist {
    pub id: Id,
    pub name: String,
    /// Absolute path to the `.xspf` file; empty for virtual playlists.
    pub path: PathBuf,
    pub created: SystemTime,
    pub changed: SystemTime,
    pub comment: Option<String>,
    pub items: Vec<PlaylistItem>,
    pub cover_art: Option<CoverArt>,
    /// Playlist-level `<extension>` elements under namespaces this crate
    /// does not own.
    pub playlist_extensions: Vec<ForeignExtension>,
    /// Per-track foreign extensions, indexed in parallel with `items`.
    pub track_extensions: Vec<Vec<ForeignExtension>>,
    pub is_virtual: bool,
}

impl Playlist {
    pub const VIRTUAL_ALL_SONGS: &'static str = "virtual:all-songs";
    pub const VIRTUAL_MISSING_TRACKS: &'static str = "virtual:missing-tracks";
    pub const VIRTUAL_NO_REPLAY_GAIN: &'static str = "virtual:no-replay-gain";
}

/// A playlist entry whose referenced file could not be found during scan.
#[derive(Debug, Clone)]
pub struct MissingPlaylistItem {
    pub playlist_name: String,
    pub playlist_id: Id,
    pub relative_path: PathBuf,
    pub added_date: Option<SystemTime>,
}

/// A playlist file that failed to parse.
#[derive(Debug, Clone)]
pub struct InvalidPlaylist {
    pub path: PathBuf,
    pub reason: String,
}

/// Fallback display names for blank/whitespace-only artist and album
/// fields (§3 invariant).
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

/// Trim and collapse a name to `UNKNOWN_ARTIST`/`UNKNOWN_ALBUM` if blank.
pub fn normalize_name(raw: &str, fallback: &'static str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}
