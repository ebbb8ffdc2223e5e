//! Computed, read-only playlists over a snapshot (§3, §4.E): `All Songs`,
//! `Missing Tracks`, `No Replay Gain`. No teacher counterpart — these are a
//! pure translation of the spec's virtual-playlist table.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::CatalogSnapshot;
use crate::id;
use crate::model::{Playlist, PlaylistItem, Song};

pub const ALL_SONGS_NAME: &str = "All Songs";
pub const MISSING_TRACKS_NAME: &str = "Missing Tracks";
pub const NO_REPLAY_GAIN_NAME: &str = " No Replay Gain";

fn empty_playlist(id: &str, name: &str, items: Vec<PlaylistItem>, epoch: SystemTime) -> Playlist {
    let track_extensions = vec![Vec::new(); items.len()];
    Playlist {
        id: id.to_string(),
        name: name.to_string(),
        path: PathBuf::new(),
        created: epoch,
        changed: epoch,
        comment: None,
        items,
        cover_art: None,
        playlist_extensions: Vec::new(),
        track_extensions,
        is_virtual: true,
    }
}

pub fn all_songs(snapshot: &CatalogSnapshot) -> Playlist {
    let epoch = snapshot.last_scan.unwrap_or(SystemTime::UNIX_EPOCH);
    let items: Vec<PlaylistItem> = snapshot
        .songs
        .values()
        .map(|s| PlaylistItem {
            song_id: s.id.clone(),
            added_date: s.created,
        })
        .collect();

    empty_playlist(Playlist::VIRTUAL_ALL_SONGS, ALL_SONGS_NAME, items, epoch)
}

/// `None` when there are no missing items — the playlist is omitted from
/// enumerations entirely rather than shown empty (§4.E).
pub fn missing_tracks(snapshot: &CatalogSnapshot) -> Option<Playlist> {
    if snapshot.missing_playlist_items.is_empty() {
        return None;
    }

    let epoch = snapshot.last_scan.unwrap_or(SystemTime::UNIX_EPOCH);
    let items: Vec<PlaylistItem> = snapshot
        .missing_playlist_items
        .iter()
        .map(|m| PlaylistItem {
            song_id: missing_track_song_id(&m.playlist_id, &m.relative_path),
            added_date: m.added_date.unwrap_or(epoch),
        })
        .collect();

    Some(empty_playlist(
        Playlist::VIRTUAL_MISSING_TRACKS,
        MISSING_TRACKS_NAME,
        items,
        epoch,
    ))
}

/// `None` when every song has a track gain value (§4.E).
pub fn no_replay_gain(snapshot: &CatalogSnapshot) -> Option<Playlist> {
    let epoch = snapshot.last_scan.unwrap_or(SystemTime::UNIX_EPOCH);
    let items: Vec<PlaylistItem> = snapshot
        .songs
        .values()
        .filter(|s| !s.replay_gain.has_track_gain())
        .map(|s| PlaylistItem {
            song_id: s.id.clone(),
            added_date: s.created,
        })
        .collect();

    if items.is_empty() {
        return None;
    }

    Some(empty_playlist(
        Playlist::VIRTUAL_NO_REPLAY_GAIN,
        NO_REPLAY_GAIN_NAME,
        items,
        epoch,
    ))
}

/// Deterministic ID for a synthetic "missing track" song, so repeated scans
/// over the same missing entry keep producing the same ID.
pub fn missing_track_song_id(playlist_id: &str, relative_path: &Path) -> String {
    id::lyrics_id(&format!("missing:{playlist_id}:{}", relative_path.display()))
}

/// Build the synthetic `Song` a missing-tracks playlist item points at, so
/// `CatalogSnapshot::get_song` resolves it like any other song. Populated by
/// the scanner into `CatalogSnapshot::missing_track_songs` during assembly.
pub fn missing_track_song(playlist_id: &str, relative_path: &Path, added_date: SystemTime) -> Song {
    Song {
        id: missing_track_song_id(playlist_id, relative_path),
        path: relative_path.to_path_buf(),
        title: format!("[Missing] {}", relative_path.display()),
        album: String::new(),
        album_artist: String::new(),
        artist: String::new(),
        genre: None,
        track_number: None,
        year: None,
        duration_secs: 0,
        size_bytes: 0,
        bitrate_kbps: None,
        suffix: String::new(),
        content_type: "application/octet-stream".to_string(),
        isrc: None,
        replay_gain: Default::default(),
        lyrics: None,
        cover_art: None,
        created: added_date,
        album_id: None,
        artist_id: None,
        parent_id: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MissingPlaylistItem;

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
    fn all_songs_includes_every_song() {
        let mut snapshot = CatalogSnapshot::default();
        let song = sample_song("s1", "One");
        snapshot.songs.insert(song.id.clone(), song);
        let playlist = all_songs(&snapshot);
        assert_eq!(playlist.items.len(), 1);
        assert!(playlist.is_virtual);
    }

    #[test]
    fn missing_tracks_omitted_when_empty() {
        let snapshot = CatalogSnapshot::default();
        assert!(missing_tracks(&snapshot).is_none());
    }

    #[test]
    fn missing_tracks_present_when_nonempty() {
        let mut snapshot = CatalogSnapshot::default();
        snapshot.missing_playlist_items.push(MissingPlaylistItem {
            playlist_name: "p".to_string(),
            playlist_id: "pid".to_string(),
            relative_path: "gone.mp3".into(),
            added_date: Some(SystemTime::now()),
        });
        let playlist = missing_tracks(&snapshot).unwrap();
        assert_eq!(playlist.items.len(), 1);
    }

    #[test]
    fn no_replay_gain_omitted_when_all_songs_have_gain() {
        let mut snapshot = CatalogSnapshot::default();
        let mut song = sample_song("s1", "One");
        song.replay_gain.track_gain_db = Some(-6.0);
        snapshot.songs.insert(song.id.clone(), song);
        assert!(no_replay_gain(&snapshot).is_none());
    }

    #[test]
    fn no_replay_gain_present_when_some_songs_lack_gain() {
        let mut snapshot = CatalogSnapshot::default();
        let song = sample_song("s1", "One");
        snapshot.songs.insert(song.id.clone(), song);
        let playlist = no_replay_gain(&snapshot).unwrap();
        assert_eq!(playlist.items.len(), 1);
    }

    #[test]
    fn missing_track_song_id_is_deterministic() {
        let path = Path::new("gone.mp3");
        assert_eq!(
            missing_track_song_id("pid", path),
            missing_track_song_id("pid", path)
        );
    }
}
