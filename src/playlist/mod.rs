//! Playlist parser/serializer (§4.D): XSPF as the on-disk format, M3U/M3U8
//! as a legacy format converted to XSPF the first time it is seen.

mod m3u;
mod xspf;

pub use xspf::{XspfDocument, XspfTrack, MEZIANTOU_NS};

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use crate::error::{Error, Result, ResultExt};
use crate::model::{ForeignExtension, Id, MissingPlaylistItem, Playlist, PlaylistItem};
use crate::scanrecord::{iso8601_to_system_time, system_time_to_iso8601};

/// A playlist file read off disk, with string locations relative to the
/// playlist file itself (not the library root — see §6).
#[derive(Debug, Clone)]
pub struct LoadedPlaylist {
    pub xspf_path: PathBuf,
    pub name: String,
    pub comment: Option<String>,
    pub tracks: Vec<LoadedTrack>,
    pub extensions: Vec<ForeignExtension>,
}

#[derive(Debug, Clone)]
pub struct LoadedTrack {
    pub location: String,
    pub added_at: Option<SystemTime>,
    pub extensions: Vec<ForeignExtension>,
}

/// Read and parse an `.xspf` file.
pub fn load_xspf(path: &Path) -> Result<LoadedPlaylist> {
    let contents = std::fs::read_to_string(path)
        .with_context(format!("reading playlist {}", path.display()))?;
    let doc = xspf::parse(&contents)
        .map_err(|e| Error::parse(e.to_string()))
        .with_context(format!("parsing {}", path.display()))?;

    let name = doc.title.clone().unwrap_or_else(|| default_name(path));
    let tracks = doc
        .tracks
        .into_iter()
        .map(|t| LoadedTrack {
            location: t.location,
            added_at: t.added_at.as_deref().and_then(iso8601_to_system_time),
            extensions: t.extensions,
        })
        .collect();

    Ok(LoadedPlaylist {
        xspf_path: path.to_path_buf(),
        name,
        comment: doc.annotation,
        tracks,
        extensions: doc.extensions,
    })
}

/// Serialize `playlist` and write it to `playlist.xspf_path`.
pub fn save_xspf(playlist: &LoadedPlaylist) -> Result<()> {
    let doc = XspfDocument {
        title: Some(playlist.name.clone()),
        annotation: playlist.comment.clone(),
        tracks: playlist
            .tracks
            .iter()
            .map(|t| XspfTrack {
                location: t.location.clone(),
                added_at: t.added_at.map(system_time_to_iso8601),
                extensions: t.extensions.clone(),
            })
            .collect(),
        extensions: playlist.extensions.clone(),
    };
    let xml = xspf::serialize(&doc);
    std::fs::write(&playlist.xspf_path, xml)
        .with_context(format!("writing playlist {}", playlist.xspf_path.display()))
}

/// Convert a legacy `.m3u`/`.m3u8` file to XSPF, unless a sibling `.xspf`
/// already exists (in which case the legacy file is left untouched and the
/// caller should skip it — the sibling `.xspf` is the authoritative
/// playlist). Returns the new XSPF path on conversion.
pub fn convert_m3u_if_needed(m3u_path: &Path, now: SystemTime) -> Result<Option<PathBuf>> {
    let xspf_path = m3u_path.with_extension("xspf");
    if xspf_path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(m3u_path)
        .with_context(format!("reading legacy playlist {}", m3u_path.display()))?;
    let locations = m3u::parse(&contents);

    let doc = XspfDocument {
        title: Some(default_name(&xspf_path)),
        annotation: None,
        tracks: locations
            .into_iter()
            .map(|location| XspfTrack {
                location,
                added_at: Some(system_time_to_iso8601(now)),
                extensions: vec![],
            })
            .collect(),
        extensions: vec![],
    };

    let xml = xspf::serialize(&doc);
    std::fs::write(&xspf_path, xml)
        .with_context(format!("writing converted playlist {}", xspf_path.display()))?;

    let backup_path = m3u_path.with_extension(format!(
        "{}.bak",
        m3u_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("m3u")
    ));
    std::fs::rename(m3u_path, &backup_path)
        .with_context(format!("backing up {} to {}", m3u_path.display(), backup_path.display()))?;

    Ok(Some(xspf_path))
}

fn default_name(xspf_path: &Path) -> String {
    xspf_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("playlist")
        .to_string()
}

/// Turn a `LoadedPlaylist` into a catalog `Playlist` plus missing-item
/// diagnostics, by resolving each `<location>` (relative to the XSPF file)
/// against `path_index` (absolute song path → song ID). Shared by the
/// scanner's full-tree assembly and the playlist mutator's create/update/
/// rename operations, so playlist-ID derivation and missing-item handling
/// stay single-sourced (§4.F step 5, §4.I).
pub fn resolve(
    loaded: &LoadedPlaylist,
    relative_xspf_path: &Path,
    path_index: &HashMap<PathBuf, Id>,
    fallback_time: SystemTime,
) -> (Playlist, Vec<MissingPlaylistItem>) {
    let id = crate::id::playlist_id(&relative_xspf_path.to_string_lossy());
    let xspf_dir = loaded.xspf_path.parent().unwrap_or_else(|| Path::new(""));

    let mut items = Vec::new();
    let mut track_extensions = Vec::new();
    let mut missing = Vec::new();

    for track in &loaded.tracks {
        let absolute = normalize_path(&xspf_dir.join(&track.location));
        if let Some(song_id) = path_index.get(&absolute) {
            items.push(PlaylistItem {
                song_id: song_id.clone(),
                added_date: track.added_at.unwrap_or(fallback_time),
            });
            track_extensions.push(track.extensions.clone());
        } else {
            missing.push(MissingPlaylistItem {
                playlist_name: loaded.name.clone(),
                playlist_id: id.clone(),
                relative_path: PathBuf::from(&track.location),
                added_date: track.added_at,
            });
        }
    }

    let metadata = std::fs::metadata(&loaded.xspf_path).ok();
    let created = metadata
        .as_ref()
        .and_then(|m| m.created().ok())
        .unwrap_or(fallback_time);
    let changed = metadata
        .as_ref()
        .and_then(|m| m.modified().ok())
        .unwrap_or(fallback_time);

    let playlist = Playlist {
        id,
        name: loaded.name.clone(),
        path: loaded.xspf_path.clone(),
        created,
        changed,
        comment: loaded.comment.clone(),
        items,
        cover_art: None,
        playlist_extensions: loaded.extensions.clone(),
        track_extensions,
        is_virtual: false,
    };
    (playlist, missing)
}

/// Lexically collapse `..`/`.` components without touching the filesystem
/// (no symlink resolution) so a joined `<xspf-dir>/<location>` matches the
/// absolute paths recorded in `path_index`.
fn normalize_path(path: &Path) -> PathBuf {
    let mut out = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out.into_iter().collect()
}

/// Is this an audio-adjacent playlist file this module knows how to read?
pub fn is_playlist_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref(),
        Some("xspf") | Some("m3u") | Some("m3u8")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_then_save_round_trips_location_and_added_at() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("list.xspf");
        let now = SystemTime::now();

        let playlist = LoadedPlaylist {
            xspf_path: path.clone(),
            name: "My List".to_string(),
            comment: Some("notes".to_string()),
            tracks: vec![LoadedTrack {
                location: "song1.mp3".to_string(),
                added_at: Some(now),
                extensions: vec![],
            }],
            extensions: vec![],
        };

        save_xspf(&playlist).unwrap();
        let reloaded = load_xspf(&path).unwrap();

        assert_eq!(reloaded.name, "My List");
        assert_eq!(reloaded.comment, Some("notes".to_string()));
        assert_eq!(reloaded.tracks[0].location, "song1.mp3");
    }

    #[test]
    fn load_xspf_on_malformed_xml_surfaces_as_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.xspf");
        std::fs::write(&path, "<playlist><trackList></title></playlist>").unwrap();

        let err = load_xspf(&path).unwrap_err();
        let root = match err {
            Error::WithContext { source, .. } => *source,
            other => other,
        };
        assert!(matches!(root, Error::Parse(_)), "expected Parse, got {root:?}");
    }

    #[test]
    fn m3u_conversion_creates_xspf_and_backs_up_original() {
        let dir = tempdir().unwrap();
        let m3u_path = dir.path().join("list.m3u");
        std::fs::write(&m3u_path, "song1.mp3\nsong2.mp3\n").unwrap();

        let xspf_path = convert_m3u_if_needed(&m3u_path, SystemTime::now())
            .unwrap()
            .expect("conversion should occur");

        assert!(xspf_path.exists());
        assert!(dir.path().join("list.m3u.bak").exists());
        assert!(!m3u_path.exists());

        let loaded = load_xspf(&xspf_path).unwrap();
        assert_eq!(loaded.tracks.len(), 2);
        assert!(loaded.tracks.iter().all(|t| t.added_at.is_some()));
    }

    #[test]
    fn m3u_conversion_skipped_when_xspf_sibling_exists() {
        let dir = tempdir().unwrap();
        let m3u_path = dir.path().join("list.m3u");
        let xspf_path = dir.path().join("list.xspf");
        std::fs::write(&m3u_path, "song1.mp3\n").unwrap();
        std::fs::write(&xspf_path, "<playlist/>").unwrap();

        let result = convert_m3u_if_needed(&m3u_path, SystemTime::now()).unwrap();
        assert!(result.is_none());
        assert!(m3u_path.exists(), "untouched legacy file should remain");
    }

    #[test]
    fn resolve_splits_present_and_missing_items() {
        let dir = tempdir().unwrap();
        let xspf_path = dir.path().join("subfolder").join("p.xspf");
        let present = dir.path().join("subfolder").join("present.mp3");

        let loaded = LoadedPlaylist {
            xspf_path: xspf_path.clone(),
            name: "p".to_string(),
            comment: None,
            tracks: vec![
                LoadedTrack {
                    location: "present.mp3".to_string(),
                    added_at: Some(SystemTime::now()),
                    extensions: vec![],
                },
                LoadedTrack {
                    location: "gone.mp3".to_string(),
                    added_at: None,
                    extensions: vec![],
                },
            ],
            extensions: vec![],
        };

        let mut path_index = std::collections::HashMap::new();
        path_index.insert(present, "song-id".to_string());

        let (playlist, missing) = resolve(
            &loaded,
            Path::new("subfolder/p.xspf"),
            &path_index,
            SystemTime::now(),
        );

        assert_eq!(playlist.items.len(), 1);
        assert_eq!(playlist.items[0].song_id, "song-id");
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].relative_path, PathBuf::from("gone.mp3"));
        assert_eq!(missing[0].playlist_name, "p");
    }

    #[test]
    fn is_playlist_file_recognizes_known_extensions() {
        assert!(is_playlist_file(Path::new("a.xspf")));
        assert!(is_playlist_file(Path::new("a.M3U")));
        assert!(is_playlist_file(Path::new("a.m3u8")));
        assert!(!is_playlist_file(Path::new("a.mp3")));
    }
}
