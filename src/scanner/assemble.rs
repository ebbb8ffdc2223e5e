//! Pure catalog assembly (§4.F step 5, §3): turn a flat list of scanned
//! songs into the grouped entities a `CatalogSnapshot` holds — albums,
//! artists, directories, genres — with every cross-reference resolved to an
//! ID. Deliberately free of I/O so the grouping rules (whitespace
//! normalization, album bucketing, directory hierarchy) can be tested
//! without touching a filesystem.
//!
//! No teacher counterpart: the teacher's `scanner/mod.rs` only ever yielded a
//! flat stream of paths and never grouped anything.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::time::SystemTime;

use crate::id;
use crate::model::{
    normalize_name, Album, Artist, Directory, Id, Song, UNKNOWN_ALBUM, UNKNOWN_ARTIST,
};

/// The grouped output of one assembly pass, keyed exactly as
/// `CatalogSnapshot` wants them.
pub struct Assembled {
    pub songs: HashMap<Id, Song>,
    pub albums: HashMap<Id, Album>,
    pub artists: HashMap<Id, Artist>,
    pub directories: HashMap<Id, Directory>,
    pub genres: BTreeMap<String, BTreeSet<Id>>,
}

struct AlbumGroup {
    artist_display: String,
    album_display: String,
    song_ids: Vec<Id>,
    year: Option<i32>,
    genre: Option<String>,
    created: SystemTime,
}

struct ArtistGroup {
    display: String,
    album_ids: Vec<Id>,
}

/// Normalize names, bucket songs into albums and albums into artists, build
/// the directory tree, and derive every ID (§4.B). `raw_songs` must already
/// have `id`/`path`/`created` set by the caller; `album_id`/`artist_id`/
/// `parent_id` are filled in here.
pub fn assemble(raw_songs: Vec<Song>, root: &Path) -> Assembled {
    let mut songs: HashMap<Id, Song> = HashMap::new();
    let mut directories: HashMap<Id, Directory> = HashMap::new();
    let mut genres: BTreeMap<String, BTreeSet<Id>> = BTreeMap::new();
    let mut album_groups: HashMap<(String, String), AlbumGroup> = HashMap::new();

    for mut song in raw_songs {
        song.album_artist = normalize_name(&song.album_artist, UNKNOWN_ARTIST);
        song.album = normalize_name(&song.album, UNKNOWN_ALBUM);
        song.artist = normalize_name(&song.artist, UNKNOWN_ARTIST);

        if let Some(genre) = &song.genre {
            genres.entry(genre.clone()).or_default().insert(song.id.clone());
        }

        let parent_dir = song
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.to_path_buf());
        let parent_id = ensure_directory(&mut directories, root, &parent_dir);
        directories.get_mut(&parent_id).unwrap().songs.push(song.id.clone());
        song.parent_id = Some(parent_id);

        let album_key = (
            song.album_artist.to_lowercase(),
            song.album.to_lowercase(),
        );
        let group = album_groups.entry(album_key).or_insert_with(|| AlbumGroup {
            artist_display: song.album_artist.clone(),
            album_display: song.album.clone(),
            song_ids: Vec::new(),
            year: None,
            genre: None,
            created: song.created,
        });
        group.song_ids.push(song.id.clone());
        group.year = group.year.or(song.year);
        group.genre = group.genre.clone().or_else(|| song.genre.clone());
        if song.created < group.created {
            group.created = song.created;
        }

        songs.insert(song.id.clone(), song);
    }

    let mut albums: HashMap<Id, Album> = HashMap::new();
    let mut artist_groups: HashMap<String, ArtistGroup> = HashMap::new();

    for group in album_groups.into_values() {
        let album_id = id::album_id(&group.artist_display, &group.album_display);

        let mut song_ids = group.song_ids;
        song_ids.sort_by_key(|sid| songs.get(sid).and_then(|s| s.track_number).unwrap_or(0));

        let duration_secs = song_ids
            .iter()
            .filter_map(|sid| songs.get(sid))
            .map(|s| s.duration_secs)
            .sum();
        let cover_art = song_ids
            .iter()
            .filter_map(|sid| songs.get(sid))
            .find_map(|s| s.cover_art.clone());

        for sid in &song_ids {
            if let Some(s) = songs.get_mut(sid) {
                s.album_id = Some(album_id.clone());
            }
        }

        let artist_key = group.artist_display.to_lowercase();
        artist_groups
            .entry(artist_key)
            .or_insert_with(|| ArtistGroup {
                display: group.artist_display.clone(),
                album_ids: Vec::new(),
            })
            .album_ids
            .push(album_id.clone());

        albums.insert(
            album_id.clone(),
            Album {
                id: album_id,
                name: group.album_display,
                artist_name: group.artist_display,
                artist_id: String::new(),
                year: group.year,
                genre: group.genre,
                duration_secs,
                song_count: song_ids.len(),
                created: group.created,
                songs: song_ids,
                cover_art,
            },
        );
    }

    let mut artists: HashMap<Id, Artist> = HashMap::new();

    for group in artist_groups.into_values() {
        let artist_id = id::artist_id(&group.display);

        for album_id in &group.album_ids {
            if let Some(album) = albums.get_mut(album_id) {
                album.artist_id = artist_id.clone();
                let song_ids = album.songs.clone();
                for sid in song_ids {
                    if let Some(s) = songs.get_mut(&sid) {
                        s.artist_id = Some(artist_id.clone());
                    }
                }
            }
        }

        let cover_art = group
            .album_ids
            .iter()
            .filter_map(|aid| albums.get(aid))
            .find_map(|a| a.cover_art.clone());

        artists.insert(
            artist_id.clone(),
            Artist {
                id: artist_id,
                name: group.display,
                albums: group.album_ids,
                cover_art,
            },
        );
    }

    Assembled {
        songs,
        albums,
        artists,
        directories,
        genres,
    }
}

/// Ensure a `Directory` entity exists for `dir_path` and every ancestor up to
/// (and including) `root`, wiring `parent_id`/`children` along the way.
/// Returns the directory's ID. Idempotent: calling it again for the same
/// path (from a sibling file) reuses the existing entry.
fn ensure_directory(directories: &mut HashMap<Id, Directory>, root: &Path, dir_path: &Path) -> Id {
    let dir_id = id::dir_id(&dir_path.to_string_lossy());
    if directories.contains_key(&dir_id) {
        return dir_id;
    }

    let name = dir_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    let parent_id = if dir_path == root {
        None
    } else {
        match dir_path.parent() {
            Some(parent) => Some(ensure_directory(directories, root, parent)),
            None => None,
        }
    };

    directories.insert(
        dir_id.clone(),
        Directory {
            id: dir_id.clone(),
            name,
            path: dir_path.to_path_buf(),
            parent_id: parent_id.clone(),
            songs: Vec::new(),
            children: Vec::new(),
        },
    );

    if let Some(parent_id) = parent_id {
        if let Some(parent) = directories.get_mut(&parent_id) {
            parent.children.push(dir_id.clone());
        }
    }

    dir_id
}
