//! The catalog: an immutable in-memory snapshot plus the long-lived service
//! that publishes new ones (§4.E).
//!
//! No teacher module owns a concept like this (the teacher's `db` module is
//! a SQLite-backed, mutable, query-per-call design). Grounded instead on
//! `other_examples`' axum-based media servers (`g2p-joujou`,
//! `knylbyte-tuliprox`), both of which hold a read-mostly, swap-on-write
//! `arc_swap::ArcSwap<T>` around their equivalent of this snapshot — the
//! idiomatic shape for "many lock-free readers, one writer that swaps the
//! whole thing" (§5, §9).

mod virtual_playlists;

use arc_swap::ArcSwap;
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::error::{Error, Result};
use crate::model::{Album, Artist, CoverArt, Directory, Id, InvalidPlaylist, MissingPlaylistItem, Playlist, Song};

pub use virtual_playlists::{NO_REPLAY_GAIN_NAME, ALL_SONGS_NAME, MISSING_TRACKS_NAME};
pub(crate) use virtual_playlists::{missing_track_song, missing_track_song_id};

/// The immutable, in-memory model published by the scanner. Cheap to
/// `Clone` structurally where unchanged (maps share their `Arc` backing via
/// `im`-free plain `HashMap`s copy-on-write at the snapshot level — whole
/// snapshots are replaced, not patched, per §9).
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub root: PathBuf,
    pub last_scan: Option<SystemTime>,
    pub songs: HashMap<Id, Song>,
    pub albums: HashMap<Id, Album>,
    pub artists: HashMap<Id, Artist>,
    pub directories: HashMap<Id, Directory>,
    pub playlists: HashMap<Id, Playlist>,
    pub cover_arts: HashMap<Id, CoverArt>,
    /// Genre → song IDs, ordinal-sorted by construction (`BTreeMap`).
    pub genres: BTreeMap<String, BTreeSet<Id>>,
    pub missing_playlist_items: Vec<MissingPlaylistItem>,
    pub invalid_playlists: Vec<InvalidPlaylist>,
    /// Synthetic songs backing `virtual:missing-tracks` entries, so
    /// `get_song` resolves them the same as any real song (§8 invariant:
    /// `GetSong(s.Id) = s` for all songs, including virtual ones).
    pub missing_track_songs: HashMap<Id, Song>,
}

impl CatalogSnapshot {
    pub fn get_song(&self, id: &str) -> Option<&Song> {
        self.songs.get(id).or_else(|| self.missing_track_songs.get(id))
    }

    pub fn get_album(&self, id: &str) -> Option<&Album> {
        self.albums.get(id)
    }

    pub fn get_artist(&self, id: &str) -> Option<&Artist> {
        self.artists.get(id)
    }

    pub fn get_directory(&self, id: &str) -> Option<&Directory> {
        self.directories.get(id)
    }

    /// Real, on-disk playlists only; virtual ones are synthesized by
    /// `get_playlist`/`list_playlists` on demand.
    pub fn get_real_playlist(&self, id: &str) -> Option<&Playlist> {
        self.playlists.get(id)
    }

    /// `GetCoverArt(id)` (§4.G): `id` may itself be a cover ID, or a song or
    /// album ID, in which case the owning entity's cover is resolved
    /// transparently.
    pub fn resolve_cover_art(&self, id: &str) -> Option<&CoverArt> {
        if let Some(cover) = self.cover_arts.get(id) {
            return Some(cover);
        }
        if let Some(song) = self.get_song(id) {
            return song.cover_art.as_ref();
        }
        if let Some(album) = self.get_album(id) {
            return album.cover_art.as_ref();
        }
        None
    }

    pub fn get_playlist(&self, id: &str) -> Option<Playlist> {
        match id {
            Playlist::VIRTUAL_ALL_SONGS => Some(virtual_playlists::all_songs(self)),
            Playlist::VIRTUAL_MISSING_TRACKS => virtual_playlists::missing_tracks(self),
            Playlist::VIRTUAL_NO_REPLAY_GAIN => virtual_playlists::no_replay_gain(self),
            _ => self.playlists.get(id).cloned(),
        }
    }

    pub fn list_playlists(&self) -> Vec<Playlist> {
        let mut all: Vec<Playlist> = self.playlists.values().cloned().collect();
        all.push(virtual_playlists::all_songs(self));
        if let Some(p) = virtual_playlists::missing_tracks(self) {
            all.push(p);
        }
        if let Some(p) = virtual_playlists::no_replay_gain(self) {
            all.push(p);
        }
        all
    }

    pub fn genres(&self) -> Vec<String> {
        self.genres.keys().cloned().collect()
    }

    pub fn songs_by_genre(&self, genre: &str) -> Vec<&Song> {
        self.genres
            .get(genre)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(|id| self.songs.get(id))
            .collect()
    }

    pub fn newest_albums(&self, n: usize) -> Vec<&Album> {
        let mut albums: Vec<&Album> = self.albums.values().collect();
        albums.sort_by(|a, b| b.created.cmp(&a.created));
        albums.truncate(n);
        albums
    }

    pub fn random_albums(&self, n: usize) -> Vec<&Album> {
        let mut albums: Vec<&Album> = self.albums.values().collect();
        albums.shuffle(&mut rand::rng());
        albums.truncate(n);
        albums
    }

    pub fn random_songs(&self, n: usize) -> Vec<&Song> {
        let mut songs: Vec<&Song> = self.songs.values().collect();
        songs.shuffle(&mut rand::rng());
        songs.truncate(n);
        songs
    }

    /// Case-insensitive substring search over artists, albums (by album
    /// name or album-artist name), and songs (by title, artist, or album).
    pub fn search_all(&self, query: &str) -> SearchResults {
        let needle = query.to_lowercase();
        let contains = |haystack: &str| haystack.to_lowercase().contains(&needle);

        let artists = self
            .artists
            .values()
            .filter(|a| contains(&a.name))
            .cloned()
            .collect();

        let albums = self
            .albums
            .values()
            .filter(|a| contains(&a.name) || contains(&a.artist_name))
            .cloned()
            .collect();

        let songs = self
            .songs
            .values()
            .filter(|s| contains(&s.title) || contains(&s.artist) || contains(&s.album))
            .cloned()
            .collect();

        SearchResults { artists, albums, songs }
    }
}

#[derive(Debug, Default)]
pub struct SearchResults {
    pub artists: Vec<Artist>,
    pub albums: Vec<Album>,
    pub songs: Vec<Song>,
}

/// `GetLyrics(songId)` (§4.E): embedded lyrics were captured at scan time
/// and are returned from memory; external `.lrc` sidecars are re-read and
/// re-parsed on every call since they can change independently of the
/// audio file they belong to.
pub fn resolve_lyrics(song: &Song, root: &Path) -> Option<String> {
    let lyrics = song.lyrics.as_ref()?;
    if lyrics.is_embedded {
        lyrics.embedded_text.clone()
    } else {
        let contents = std::fs::read_to_string(root.join(&lyrics.source_path)).ok()?;
        Some(crate::lrc::parse(&contents))
    }
}

/// Snapshot of the scanner's progress counters (§4.F state).
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanStatus {
    pub is_scanning: bool,
    pub is_initial_scan_completed: bool,
    pub scan_count: u64,
    pub progress: f64,
    pub eta: Option<std::time::Duration>,
}

/// The long-lived catalog service: owns the published snapshot and the
/// scanner's status counters — the only global mutable state this crate
/// has (§9).
pub struct Catalog {
    snapshot: ArcSwap<CatalogSnapshot>,
    scan_mutex: tokio::sync::Mutex<()>,
    is_scanning: AtomicBool,
    initial_scan_completed: AtomicBool,
    scan_count: AtomicU64,
    last_scan_date: Mutex<Option<SystemTime>>,
    progress_bits: AtomicU64,
    eta_secs: AtomicU64,
}

impl Catalog {
    pub fn new(root: PathBuf) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(CatalogSnapshot {
                root,
                ..Default::default()
            }),
            scan_mutex: tokio::sync::Mutex::new(()),
            is_scanning: AtomicBool::new(false),
            initial_scan_completed: AtomicBool::new(false),
            scan_count: AtomicU64::new(0),
            last_scan_date: Mutex::new(None),
            progress_bits: AtomicU64::new(0),
            eta_secs: AtomicU64::new(u64::MAX),
        }
    }

    /// The currently published snapshot. Cheap: one atomic load, no locks.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.snapshot.load_full()
    }

    /// Publish a new snapshot atomically (§5).
    pub fn publish(&self, snapshot: CatalogSnapshot) {
        self.snapshot.store(Arc::new(snapshot));
    }

    pub fn status(&self) -> ScanStatus {
        let eta_secs = self.eta_secs.load(Ordering::Relaxed);
        ScanStatus {
            is_scanning: self.is_scanning.load(Ordering::Relaxed),
            is_initial_scan_completed: self.initial_scan_completed.load(Ordering::Relaxed),
            scan_count: self.scan_count.load(Ordering::Relaxed),
            progress: f64::from_bits(self.progress_bits.load(Ordering::Relaxed)),
            eta: (eta_secs != u64::MAX).then(|| std::time::Duration::from_secs(eta_secs)),
        }
    }

    pub(crate) fn set_progress(&self, progress: f64, eta: Option<std::time::Duration>) {
        self.progress_bits.store(progress.to_bits(), Ordering::Relaxed);
        self.eta_secs
            .store(eta.map(|d| d.as_secs()).unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    /// Try to acquire the scan slot without waiting. `None` means a scan is
    /// already in flight and the caller's trigger is coalesced away (§4.F
    /// step 1, §9 "prefer try-lock over a queue").
    pub(crate) fn try_begin_scan(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        let guard = self.scan_mutex.try_lock().ok()?;
        self.is_scanning.store(true, Ordering::Relaxed);
        Some(guard)
    }

    /// Acquire the single-writer slot for a playlist mutation. Unlike
    /// `try_begin_scan`, this waits for an in-flight scan to finish rather
    /// than coalescing away, since a playlist edit must not be silently
    /// dropped (§5: "one writer at a time, scanner or playlist mutator").
    pub(crate) async fn begin_write(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.scan_mutex.lock().await
    }

    pub(crate) fn finish_scan(&self) {
        self.is_scanning.store(false, Ordering::Relaxed);
        self.initial_scan_completed.store(true, Ordering::Relaxed);
        self.scan_count.fetch_add(1, Ordering::Relaxed);
        *self.last_scan_date.lock().unwrap() = Some(SystemTime::now());
        self.set_progress(1.0, None);
    }

    pub fn get_song(&self, id: &str) -> Result<Song> {
        self.snapshot()
            .get_song(id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("song:{id}")))
    }

    pub fn get_album(&self, id: &str) -> Result<Album> {
        self.snapshot()
            .get_album(id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("album:{id}")))
    }

    pub fn get_artist(&self, id: &str) -> Result<Artist> {
        self.snapshot()
            .get_artist(id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("artist:{id}")))
    }

    pub fn get_directory(&self, id: &str) -> Result<Directory> {
        self.snapshot()
            .get_directory(id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("directory:{id}")))
    }

    pub fn get_playlist(&self, id: &str) -> Result<Playlist> {
        self.snapshot()
            .get_playlist(id)
            .ok_or_else(|| Error::not_found(format!("playlist:{id}")))
    }

    pub fn resolve_cover_art(&self, id: &str) -> Result<CoverArt> {
        self.snapshot()
            .resolve_cover_art(id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("cover:{id}")))
    }

    pub fn get_lyrics(&self, song_id: &str) -> Result<Option<String>> {
        let snapshot = self.snapshot();
        let song = snapshot
            .get_song(song_id)
            .ok_or_else(|| Error::not_found(format!("song:{song_id}")))?;
        Ok(resolve_lyrics(song, &snapshot.root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample_song(id: &str, title: &str) -> Song {
        Song {
            id: id.to_string(),
            path: PathBuf::from(format!("{title}.mp3")),
            title: title.to_string(),
            album: "Album".into(),
            album_artist: "Artist".into(),
            artist: "Artist".into(),
            genre: Some("Rock".into()),
            track_number: None,
            year: None,
            duration_secs: 100,
            size_bytes: 1000,
            bitrate_kbps: None,
            suffix: "mp3".into(),
            content_type: "audio/mpeg".into(),
            isrc: None,
            replay_gain: Default::default(),
            lyrics: None,
            cover_art: None,
            created: SystemTime::now(),
            album_id: None,
            artist_id: None,
            parent_id: None,
        }
    }

    #[test]
    fn get_song_roundtrip_matches_invariant() {
        let catalog = Catalog::new(PathBuf::from("/music"));
        let mut snapshot = CatalogSnapshot {
            root: PathBuf::from("/music"),
            ..Default::default()
        };
        let song = sample_song("abc", "Track One");
        snapshot.songs.insert(song.id.clone(), song.clone());
        catalog.publish(snapshot);

        let fetched = catalog.get_song("abc").unwrap();
        assert_eq!(fetched.title, song.title);
    }

    #[test]
    fn get_song_unknown_id_is_not_found() {
        let catalog = Catalog::new(PathBuf::from("/music"));
        catalog.publish(CatalogSnapshot::default());
        assert!(matches!(catalog.get_song("nope"), Err(Error::NotFound(_))));
    }

    #[test]
    fn search_all_is_case_insensitive_across_fields() {
        let mut snapshot = CatalogSnapshot::default();
        let song = sample_song("abc", "Moonlight Sonata");
        snapshot.songs.insert(song.id.clone(), song);

        let results = snapshot.search_all("MOONLIGHT");
        assert_eq!(results.songs.len(), 1);
    }

    #[test]
    fn genres_are_ordinally_sorted() {
        let mut snapshot = CatalogSnapshot::default();
        snapshot.genres.insert("Rock".into(), BTreeSet::new());
        snapshot.genres.insert("Ambient".into(), BTreeSet::new());
        snapshot.genres.insert("Jazz".into(), BTreeSet::new());

        assert_eq!(snapshot.genres(), vec!["Ambient", "Jazz", "Rock"]);
    }

    #[test]
    fn resolve_cover_art_falls_back_from_song_to_its_cover() {
        let mut snapshot = CatalogSnapshot::default();
        let cover = CoverArt {
            id: "cover1".to_string(),
            source_path: PathBuf::from("track.mp3"),
            is_embedded: true,
            source_modified: SystemTime::now(),
            cache_path: PathBuf::from("/cache/cover1"),
        };
        let mut song = sample_song("abc", "Track One");
        song.cover_art = Some(cover.clone());
        snapshot.songs.insert(song.id.clone(), song);

        assert_eq!(snapshot.resolve_cover_art("cover1").unwrap().id, "cover1");
        assert_eq!(snapshot.resolve_cover_art("abc").unwrap().id, "cover1");
        assert!(snapshot.resolve_cover_art("nope").is_none());
    }

    #[test]
    fn try_begin_scan_coalesces_concurrent_triggers() {
        let catalog = Catalog::new(PathBuf::from("/music"));
        let first = catalog.try_begin_scan();
        assert!(first.is_some());

        let second = catalog.try_begin_scan();
        assert!(second.is_none(), "second concurrent trigger must be coalesced");
    }
}
