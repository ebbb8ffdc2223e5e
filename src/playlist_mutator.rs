//! Playlist mutator (§4.I): create/update/rename/delete playlist files on
//! disk and publish the updated snapshot in place.
//!
//! Slugification and collision-avoidance follow the teacher's `organizer`
//! module's filename-sanitization shape (lowercase, invalid characters
//! collapsed), extended with the spec's `" (n)"` collision suffix rule for
//! `create` (see DESIGN.md Open Question). `rename`'s `.xspf.bak` handling
//! generalizes the teacher's M3U→XSPF conversion rename-and-backup shape
//! from `playlist::convert_m3u_if_needed`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::catalog::{Catalog, CatalogSnapshot};
use crate::error::{not_found_path, Error, Result};
use crate::model::{ForeignExtension, Id, Playlist};
use crate::playlist::{self, LoadedPlaylist, LoadedTrack};

/// Load `path`'s XSPF, translating a vanished file into the path-flavored
/// `NotFound` rather than a bare IO error — the playlist existed in the
/// snapshot when the caller looked it up, so a missing file here means it
/// was removed out from under us, not an unknown ID.
fn load_xspf_or_not_found(path: &Path) -> Result<LoadedPlaylist> {
    if !path.exists() {
        return Err(not_found_path(&path.to_path_buf()));
    }
    playlist::load_xspf(path)
}

fn is_virtual(id: &str) -> bool {
    matches!(
        id,
        Playlist::VIRTUAL_ALL_SONGS | Playlist::VIRTUAL_MISSING_TRACKS | Playlist::VIRTUAL_NO_REPLAY_GAIN
    )
}

/// Lowercase the name, collapse any run of non-alphanumeric characters to a
/// single `-`, trim leading/trailing `-`. Falls back to `"playlist"` when
/// nothing alphanumeric remains.
fn slugify(name: &str) -> String {
    let mut out = String::new();
    let mut pending_dash = false;
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            out.extend(c.to_lowercase());
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }
    if out.is_empty() {
        "playlist".to_string()
    } else {
        out
    }
}

/// First free `<slug>.xspf`, then `<slug> (2).xspf`, `<slug> (3).xspf`, ...
fn unique_filename(dir: &Path, slug: &str) -> PathBuf {
    let candidate = dir.join(format!("{slug}.xspf"));
    if !candidate.exists() {
        return candidate;
    }
    let mut n = 2u32;
    loop {
        let candidate = dir.join(format!("{slug} ({n}).xspf"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

fn backup_path_for(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".bak");
    PathBuf::from(os)
}

/// `<location>` values are relative to the `.xspf` file, not the library
/// root (§6). Lexical only — no symlink resolution, matching
/// `playlist::normalize_path`'s counterpart on the read side.
fn relative_location(target: &Path, base_dir: &Path) -> PathBuf {
    let target_components: Vec<_> = target.components().collect();
    let base_components: Vec<_> = base_dir.components().collect();
    let common = target_components
        .iter()
        .zip(base_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for _ in common..base_components.len() {
        result.push("..");
    }
    for component in &target_components[common..] {
        result.push(component.as_os_str());
    }
    result
}

/// Write `loaded` to `current_path`, or — when `new_name` differs from the
/// playlist's current display name — to a freshly slugified path beside it,
/// backing up the pre-edit file as `<new>.xspf.bak` first. Fails with
/// `Conflict` if the destination already exists (§4.I Rename).
fn apply_write(current_path: &Path, mut loaded: LoadedPlaylist, new_name: Option<&str>) -> Result<PathBuf> {
    let dir = current_path.parent().unwrap_or_else(|| Path::new("."));

    let target = match new_name {
        Some(name) => dir.join(format!("{}.xspf", slugify(name))),
        None => current_path.to_path_buf(),
    };

    if target.as_path() != current_path && target.exists() {
        return Err(Error::conflict(format!(
            "a playlist file already exists at {}",
            target.display()
        )));
    }

    if let Some(name) = new_name {
        loaded.name = name.to_string();
    }

    if target.as_path() == current_path {
        loaded.xspf_path = current_path.to_path_buf();
        playlist::save_xspf(&loaded)?;
    } else {
        let backup_path = backup_path_for(&target);
        std::fs::copy(current_path, &backup_path)?;
        loaded.xspf_path = target.clone();
        playlist::save_xspf(&loaded)?;
        std::fs::remove_file(current_path)?;
    }

    Ok(target)
}

/// Re-read `xspf_path` off disk, resolve it against the current snapshot's
/// songs, and publish a new snapshot with it in place. `remove_id`, when
/// given, drops the playlist's prior ID (and its stale missing-item
/// diagnostics) first — used by `rename`/`update` when the file moved.
fn publish_from_disk(
    catalog: &Catalog,
    snapshot: &CatalogSnapshot,
    xspf_path: &Path,
    remove_id: Option<&str>,
) -> Result<Playlist> {
    let loaded = playlist::load_xspf(xspf_path)?;
    let relative = xspf_path.strip_prefix(&snapshot.root).unwrap_or(xspf_path);
    let path_index: HashMap<PathBuf, Id> = snapshot
        .songs
        .values()
        .map(|s| (s.path.clone(), s.id.clone()))
        .collect();

    let now = SystemTime::now();
    let (mut resolved, missing) = playlist::resolve(&loaded, relative, &path_index, now);
    if let Some(first) = resolved.items.first() {
        if let Some(song) = snapshot.get_song(&first.song_id) {
            resolved.cover_art = song.cover_art.clone();
        }
    }

    let mut new_snapshot = snapshot.clone();
    if let Some(old_id) = remove_id {
        new_snapshot.playlists.remove(old_id);
        new_snapshot.missing_playlist_items.retain(|m| m.playlist_id != old_id);
    }
    new_snapshot.playlists.insert(resolved.id.clone(), resolved.clone());

    for item in missing {
        let already = new_snapshot
            .missing_playlist_items
            .iter()
            .any(|m| m.playlist_id == item.playlist_id && m.relative_path == item.relative_path);
        if !already {
            new_snapshot.missing_playlist_items.push(item);
        }
    }
    new_snapshot.missing_track_songs = new_snapshot
        .missing_playlist_items
        .iter()
        .map(|m| {
            let added = m.added_date.unwrap_or(now);
            let song = crate::catalog::missing_track_song(&m.playlist_id, &m.relative_path, added);
            (song.id.clone(), song)
        })
        .collect();

    catalog.publish(new_snapshot);
    Ok(resolved)
}

/// `Create(name, comment?, songIds?)` (§4.I). Fails with `InvalidInput` if
/// `name` is empty after trimming. Song IDs that don't resolve to a known
/// song are silently dropped ("one `<track>` per *found* song").
pub async fn create(
    catalog: &Catalog,
    name: &str,
    comment: Option<String>,
    song_ids: &[Id],
) -> Result<Playlist> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid_input("playlist name must not be empty"));
    }

    let _guard = catalog.begin_write().await;
    let snapshot = catalog.snapshot();
    let root = snapshot.root.clone();

    std::fs::create_dir_all(&root)?;
    let slug = slugify(trimmed);
    let xspf_path = unique_filename(&root, &slug);

    let now = SystemTime::now();
    let tracks = song_ids
        .iter()
        .filter_map(|id| snapshot.get_song(id))
        .map(|song| LoadedTrack {
            location: relative_location(&song.path, &root).to_string_lossy().into_owned(),
            added_at: Some(now),
            extensions: Vec::new(),
        })
        .collect();

    let loaded = LoadedPlaylist {
        xspf_path: xspf_path.clone(),
        name: trimmed.to_string(),
        comment,
        tracks,
        extensions: Vec::new(),
    };
    playlist::save_xspf(&loaded)?;

    tracing::info!(path = %xspf_path.display(), "created playlist");
    publish_from_disk(catalog, &snapshot, &xspf_path, None)
}

/// `Update(id, name?, comment?, songIds?)` (§4.I). When `songIds` is given,
/// the track list is rebuilt to exactly match it; tracks that were already
/// present keep their `addedAt` and foreign extensions, new ones get
/// `addedAt = now`. `comment` is rewritten only when provided. A `name`
/// that differs from the current display name triggers the same
/// backup-and-rename dance as a standalone `rename`.
pub async fn update(
    catalog: &Catalog,
    id: &str,
    name: Option<&str>,
    comment: Option<String>,
    song_ids: Option<&[Id]>,
) -> Result<Playlist> {
    if is_virtual(id) {
        return Err(Error::unsupported(format!("cannot update virtual playlist {id}")));
    }

    let _guard = catalog.begin_write().await;
    let snapshot = catalog.snapshot();
    let current = snapshot
        .get_real_playlist(id)
        .cloned()
        .ok_or_else(|| Error::not_found(format!("playlist:{id}")))?;

    let mut loaded = load_xspf_or_not_found(&current.path)?;

    if let Some(song_ids) = song_ids {
        let xspf_dir = current.path.parent().unwrap_or(&snapshot.root);
        let path_index: HashMap<PathBuf, Id> = snapshot
            .songs
            .values()
            .map(|s| (s.path.clone(), s.id.clone()))
            .collect();

        let existing: HashMap<Id, (Option<SystemTime>, Vec<ForeignExtension>)> = loaded
            .tracks
            .iter()
            .filter_map(|t| {
                let absolute = xspf_dir.join(&t.location);
                let song_id = path_index.get(&absolute)?;
                Some((song_id.clone(), (t.added_at, t.extensions.clone())))
            })
            .collect();

        let now = SystemTime::now();
        loaded.tracks = song_ids
            .iter()
            .filter_map(|sid| snapshot.get_song(sid).map(|song| (sid, song)))
            .map(|(sid, song)| {
                let location = relative_location(&song.path, xspf_dir).to_string_lossy().into_owned();
                match existing.get(sid) {
                    Some((added_at, extensions)) => LoadedTrack {
                        location,
                        added_at: *added_at,
                        extensions: extensions.clone(),
                    },
                    None => LoadedTrack {
                        location,
                        added_at: Some(now),
                        extensions: Vec::new(),
                    },
                }
            })
            .collect();
    }

    if let Some(comment) = comment {
        loaded.comment = Some(comment);
    }

    let new_name = match name {
        Some(n) => {
            let trimmed = n.trim();
            if trimmed.is_empty() {
                return Err(Error::invalid_input("playlist name must not be empty"));
            }
            (trimmed != current.name).then(|| trimmed.to_string())
        }
        None => None,
    };

    let final_path = apply_write(&current.path, loaded, new_name.as_deref())?;

    tracing::info!(id, path = %final_path.display(), "updated playlist");
    publish_from_disk(catalog, &snapshot, &final_path, Some(id))
}

/// `Rename(id, newName)` (§4.I). Fails with `Conflict` if the destination
/// filename already exists.
pub async fn rename(catalog: &Catalog, id: &str, new_name: &str) -> Result<Playlist> {
    if is_virtual(id) {
        return Err(Error::unsupported(format!("cannot rename virtual playlist {id}")));
    }

    let trimmed = new_name.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid_input("playlist name must not be empty"));
    }

    let _guard = catalog.begin_write().await;
    let snapshot = catalog.snapshot();
    let current = snapshot
        .get_real_playlist(id)
        .cloned()
        .ok_or_else(|| Error::not_found(format!("playlist:{id}")))?;

    let loaded = load_xspf_or_not_found(&current.path)?;
    let final_path = apply_write(&current.path, loaded, Some(trimmed))?;

    tracing::info!(id, new_path = %final_path.display(), "renamed playlist");
    publish_from_disk(catalog, &snapshot, &final_path, Some(id))
}

/// `Delete(id)` (§4.I).
pub async fn delete(catalog: &Catalog, id: &str) -> Result<()> {
    if is_virtual(id) {
        return Err(Error::unsupported(format!("cannot delete virtual playlist {id}")));
    }

    let _guard = catalog.begin_write().await;
    let snapshot = catalog.snapshot();
    let current = snapshot
        .get_real_playlist(id)
        .ok_or_else(|| Error::not_found(format!("playlist:{id}")))?;
    let path = current.path.clone();

    std::fs::remove_file(&path)?;

    let mut new_snapshot = snapshot.as_ref().clone();
    new_snapshot.playlists.remove(id);
    new_snapshot.missing_playlist_items.retain(|m| m.playlist_id != id);
    new_snapshot.missing_track_songs = new_snapshot
        .missing_playlist_items
        .iter()
        .map(|m| {
            let added = m.added_date.unwrap_or_else(SystemTime::now);
            let song = crate::catalog::missing_track_song(&m.playlist_id, &m.relative_path, added);
            (song.id.clone(), song)
        })
        .collect();

    tracing::info!(id, path = %path.display(), "deleted playlist");
    catalog.publish(new_snapshot);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Song;
    use tempfile::tempdir;

    fn sample_song(root: &Path, relative: &str, id: &str) -> Song {
        Song {
            id: id.to_string(),
            path: root.join(relative),
            title: relative.to_string(),
            album: "Album".into(),
            album_artist: "Artist".into(),
            artist: "Artist".into(),
            genre: None,
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

    fn catalog_with_songs(root: &Path, songs: Vec<Song>) -> Catalog {
        let catalog = Catalog::new(root.to_path_buf());
        let mut snapshot = CatalogSnapshot {
            root: root.to_path_buf(),
            ..Default::default()
        };
        for song in songs {
            snapshot.songs.insert(song.id.clone(), song);
        }
        catalog.publish(snapshot);
        catalog
    }

    #[test]
    fn slugify_collapses_punctuation_and_lowercases() {
        assert_eq!(slugify("My Favorites!!"), "my-favorites");
        assert_eq!(slugify("  "), "playlist");
        assert_eq!(slugify("Rock & Roll"), "rock-roll");
    }

    #[tokio::test]
    async fn create_writes_xspf_and_publishes_playlist() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("song1.mp3"), b"").unwrap();
        let catalog = catalog_with_songs(
            dir.path(),
            vec![sample_song(dir.path(), "song1.mp3", "song-1")],
        );

        let playlist = create(&catalog, "My Mix", Some("notes".into()), &["song-1".to_string()])
            .await
            .unwrap();

        assert_eq!(playlist.name, "My Mix");
        assert_eq!(playlist.items.len(), 1);
        assert!(dir.path().join("my-mix.xspf").exists());
    }

    #[tokio::test]
    async fn create_avoids_filename_collision() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("my-mix.xspf"), "<playlist/>").unwrap();
        let catalog = catalog_with_songs(dir.path(), vec![]);

        let playlist = create(&catalog, "My Mix", None, &[]).await.unwrap();
        assert!(playlist.path.ends_with("my-mix (2).xspf"));
    }

    #[tokio::test]
    async fn create_rejects_blank_name() {
        let dir = tempdir().unwrap();
        let catalog = catalog_with_songs(dir.path(), vec![]);
        let err = create(&catalog, "   ", None, &[]).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn mutation_on_virtual_playlist_is_unsupported() {
        let dir = tempdir().unwrap();
        let catalog = catalog_with_songs(dir.path(), vec![]);
        let err = rename(&catalog, Playlist::VIRTUAL_ALL_SONGS, "x").await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation(_)));
    }

    #[tokio::test]
    async fn mutation_on_unknown_id_is_not_found() {
        let dir = tempdir().unwrap();
        let catalog = catalog_with_songs(dir.path(), vec![]);
        let err = delete(&catalog, "nope").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn update_reorder_preserves_added_dates_and_extensions() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp3"), b"").unwrap();
        std::fs::write(dir.path().join("b.mp3"), b"").unwrap();
        let catalog = catalog_with_songs(
            dir.path(),
            vec![
                sample_song(dir.path(), "a.mp3", "song-a"),
                sample_song(dir.path(), "b.mp3", "song-b"),
            ],
        );

        create(
            &catalog,
            "Reorder Me",
            None,
            &["song-a".to_string(), "song-b".to_string()],
        )
        .await
        .unwrap();

        let before = catalog.snapshot().playlists.values().next().unwrap().clone();
        let a_added = before.items.iter().find(|i| i.song_id == "song-a").unwrap().added_date;
        let b_added = before.items.iter().find(|i| i.song_id == "song-b").unwrap().added_date;

        let updated = update(
            &catalog,
            &before.id,
            None,
            None,
            Some(&["song-b".to_string(), "song-a".to_string()]),
        )
        .await
        .unwrap();

        assert_eq!(updated.items[0].song_id, "song-b");
        assert_eq!(updated.items[1].song_id, "song-a");
        assert_eq!(updated.items[0].added_date, b_added);
        assert_eq!(updated.items[1].added_date, a_added);
    }

    #[tokio::test]
    async fn rename_backs_up_old_file_and_moves_content() {
        let dir = tempdir().unwrap();
        let catalog = catalog_with_songs(dir.path(), vec![]);
        let created = create(&catalog, "Old Name", None, &[]).await.unwrap();

        let renamed = rename(&catalog, &created.id, "New Name").await.unwrap();

        assert_eq!(renamed.name, "New Name");
        assert!(dir.path().join("new-name.xspf").exists());
        assert!(dir.path().join("new-name.xspf.bak").exists());
        assert!(!dir.path().join("old-name.xspf").exists());
        assert!(catalog.snapshot().playlists.get(&created.id).is_none());
    }

    #[tokio::test]
    async fn rename_fails_with_conflict_when_destination_exists() {
        let dir = tempdir().unwrap();
        let catalog = catalog_with_songs(dir.path(), vec![]);
        let first = create(&catalog, "First", None, &[]).await.unwrap();
        create(&catalog, "Second", None, &[]).await.unwrap();

        let err = rename(&catalog, &first.id, "Second").await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn delete_removes_file_and_snapshot_entry() {
        let dir = tempdir().unwrap();
        let catalog = catalog_with_songs(dir.path(), vec![]);
        let created = create(&catalog, "Gone Soon", None, &[]).await.unwrap();

        delete(&catalog, &created.id).await.unwrap();

        assert!(!created.path.exists());
        assert!(catalog.snapshot().playlists.get(&created.id).is_none());
    }

    #[tokio::test]
    async fn update_on_file_vanished_out_from_under_snapshot_is_path_flavored_not_found() {
        let dir = tempdir().unwrap();
        let catalog = catalog_with_songs(dir.path(), vec![]);
        let created = create(&catalog, "Vanishing", None, &[]).await.unwrap();

        std::fs::remove_file(&created.path).unwrap();

        let err = update(&catalog, &created.id, None, None, None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(err.to_string().contains(&created.path.display().to_string()));
    }
}
