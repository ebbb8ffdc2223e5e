//! The scanner (§4.F): walks the library tree, reuses unchanged files
//! against the persisted scan record, reparses the rest, and publishes a new
//! `CatalogSnapshot` atomically.
//!
//! Grounded on the teacher's `scanner/mod.rs` (`WalkDir` inside
//! `spawn_blocking`, piped through a `tokio::sync::mpsc` channel into a
//! `Stream`) for the tree walk, generalized from a bare path lister into the
//! full eight-step pipeline: coalesce → load prior record → walk → reuse or
//! reparse → assemble → publish → persist → release.

mod assemble;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};

use walkdir::WalkDir;

use crate::catalog::{self, Catalog, CatalogSnapshot};
use crate::config::Config;
use crate::cover::{self, CoverCache};
use crate::error::{Error, Result};
use crate::id;
use crate::model::{CoverArt, InvalidPlaylist, Lyrics, Playlist, Song};
use crate::playlist;
use crate::scanrecord::{
    self, system_time_to_iso8601, InvalidPlaylistRecord, MissingPlaylistItemRecord, ScanRecord,
    ScanRecordPlaylist, ScanRecordPlaylistEntry, ScanRecordSong,
};
use crate::tags;

/// Suffixes §6 recognizes as audio. Case-insensitive.
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "m4a", "ogg", "opus", "wav", "aac", "wma"];

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Trigger a scan (§4.F step 1). A trigger arriving while one is already in
/// flight is coalesced away rather than queued (§9).
pub async fn trigger(catalog: &Catalog, config: &Config) {
    let Some(guard) = catalog.try_begin_scan() else {
        tracing::info!("scan already in progress, coalescing this trigger");
        return;
    };

    let result = run(catalog, config).await;
    drop(guard);
    catalog.finish_scan();

    match result {
        Ok(count) => tracing::info!(songs = count, "scan completed"),
        Err(e) => tracing::error!("scan aborted: {e}"),
    }
}

async fn run(catalog: &Catalog, config: &Config) -> Result<usize> {
    let start = Instant::now();
    let scan_start_time = SystemTime::now();
    let root = config.music_folder_path.clone();
    let caching_enabled = !config.cache_path.as_os_str().is_empty();

    let prior = if caching_enabled {
        scanrecord::load(&scan_record_path(config))
    } else {
        ScanRecord::default()
    };
    let prior_by_path: HashMap<PathBuf, ScanRecordSong> = prior
        .songs
        .into_iter()
        .map(|s| (s.relative_path.clone(), s))
        .collect();

    let entries = walk_tree(&root).await?;

    let mut audio_paths = Vec::new();
    let mut playlist_paths = Vec::new();
    for path in entries {
        if is_audio_file(&path) {
            audio_paths.push(path);
        } else if playlist::is_playlist_file(&path) {
            playlist_paths.push(path);
        }
    }

    let total = audio_paths.len() + playlist_paths.len();
    let mut processed = 0usize;
    catalog.set_progress(0.0, None);

    let cover_cache = caching_enabled.then(|| CoverCache::new(config.cache_path.join("covers")));

    let mut raw_songs = Vec::new();
    let mut modified_by_id: HashMap<String, SystemTime> = HashMap::new();

    for audio_path in &audio_paths {
        if let Some((song, modified)) =
            scan_one_song(audio_path, &root, &prior_by_path, cover_cache.as_ref())
        {
            modified_by_id.insert(song.id.clone(), modified);
            raw_songs.push(song);
        }
        processed += 1;
        report_progress(catalog, &start, processed, total);
    }

    let path_index: HashMap<PathBuf, String> = raw_songs
        .iter()
        .map(|s| (s.path.clone(), s.id.clone()))
        .collect();
    let song_by_id: HashMap<&String, &Song> =
        raw_songs.iter().map(|s| (&s.id, s)).collect();

    let mut playlists: HashMap<String, Playlist> = HashMap::new();
    let mut missing_playlist_items = Vec::new();
    let mut invalid_playlists = Vec::new();

    for playlist_path in &playlist_paths {
        let ext = playlist_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_lowercase();

        let xspf_path = if ext == "m3u" || ext == "m3u8" {
            match playlist::convert_m3u_if_needed(playlist_path, scan_start_time) {
                Ok(converted) => converted,
                Err(e) => {
                    invalid_playlists.push(InvalidPlaylist {
                        path: playlist_path.clone(),
                        reason: e.to_string(),
                    });
                    None
                }
            }
        } else {
            Some(playlist_path.clone())
        };

        if let Some(xspf_path) = xspf_path {
            match playlist::load_xspf(&xspf_path) {
                Ok(loaded) => {
                    let relative_xspf_path = to_relative(&root, &xspf_path);
                    let (mut resolved, mut missing) = playlist::resolve(
                        &loaded,
                        &relative_xspf_path,
                        &path_index,
                        scan_start_time,
                    );
                    if let Some(first_item) = resolved.items.first() {
                        if let Some(song) = song_by_id.get(&first_item.song_id) {
                            resolved.cover_art = song.cover_art.clone();
                        }
                    }
                    missing_playlist_items.append(&mut missing);
                    playlists.insert(resolved.id.clone(), resolved);
                }
                Err(e) => invalid_playlists.push(InvalidPlaylist {
                    path: xspf_path,
                    reason: e.to_string(),
                }),
            }
        }

        processed += 1;
        report_progress(catalog, &start, processed, total);
    }

    let assembled = assemble::assemble(raw_songs, &root);

    let mut cover_arts = HashMap::new();
    for song in assembled.songs.values() {
        if let Some(cover) = &song.cover_art {
            cover_arts.insert(cover.id.clone(), cover.clone());
        }
    }
    for album in assembled.albums.values() {
        if let Some(cover) = &album.cover_art {
            cover_arts.insert(cover.id.clone(), cover.clone());
        }
    }

    let missing_track_songs: HashMap<String, Song> = missing_playlist_items
        .iter()
        .map(|m| {
            let added = m.added_date.unwrap_or(scan_start_time);
            let song = catalog::missing_track_song(&m.playlist_id, &m.relative_path, added);
            (song.id.clone(), song)
        })
        .collect();

    let song_count = assembled.songs.len();

    let snapshot = CatalogSnapshot {
        root: root.clone(),
        last_scan: Some(scan_start_time),
        songs: assembled.songs,
        albums: assembled.albums,
        artists: assembled.artists,
        directories: assembled.directories,
        playlists,
        cover_arts,
        genres: assembled.genres,
        missing_playlist_items,
        invalid_playlists,
        missing_track_songs,
    };

    if caching_enabled {
        let record = build_scan_record(&snapshot, &root, &modified_by_id);
        if let Err(e) = scanrecord::save(&scan_record_path(config), &record) {
            tracing::warn!("failed to persist scan record: {e}");
        }
    }

    catalog.publish(snapshot);

    Ok(song_count)
}

/// Walk `root` on a blocking thread (§4.F step 3). A fatal I/O error on the
/// root path itself aborts the scan; an unreadable subtree is logged and
/// skipped so one bad directory doesn't sink the whole scan.
async fn walk_tree(root: &Path) -> Result<Vec<PathBuf>> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(&root).into_iter() {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() {
                        paths.push(entry.into_path());
                    }
                }
                Err(e) => {
                    if e.depth() == 0 {
                        return Err(Error::transient(format!(
                            "reading library root {}: {e}",
                            root.display()
                        )));
                    }
                    tracing::warn!("skipping unreadable path during scan: {e}");
                }
            }
        }
        Ok(paths)
    })
    .await
    .map_err(|e| Error::transient(format!("scan task panicked: {e}")))?
}

fn scan_record_path(config: &Config) -> PathBuf {
    config.cache_path.join("scan_record.json")
}

fn to_relative(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root)
        .map(PathBuf::from)
        .unwrap_or_else(|_| path.to_path_buf())
}

fn report_progress(catalog: &Catalog, start: &Instant, processed: usize, total: usize) {
    let total = total.max(1);
    let progress = (processed as f64 / total as f64).clamp(0.0, 1.0);
    let eta = if processed > 0 && processed < total {
        let elapsed = start.elapsed();
        let remaining = total - processed;
        Some(elapsed.mul_f64(remaining as f64 / processed as f64))
    } else {
        None
    };
    catalog.set_progress(progress, eta);
}

/// Decide reuse vs. reparse for one audio file and build its `Song` (minus
/// the `album_id`/`artist_id`/`parent_id` that assembly fills in). Any
/// failure here is swallowed — the file is skipped and the scan continues
/// (§4.A, §7) — so the return type carries no error variant.
fn scan_one_song(
    audio_path: &Path,
    root: &Path,
    prior_by_path: &HashMap<PathBuf, ScanRecordSong>,
    cover_cache: Option<&CoverCache>,
) -> Option<(Song, SystemTime)> {
    let relative_path = audio_path.strip_prefix(root).ok()?.to_path_buf();

    let metadata = match std::fs::metadata(audio_path) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!("cannot stat {}: {e}", audio_path.display());
            return None;
        }
    };
    let size_bytes = metadata.len();
    let modified = metadata.modified().unwrap_or(SystemTime::now());
    let created = metadata.created().unwrap_or(modified);

    let prior = prior_by_path.get(&relative_path);
    let reuse = prior.is_some_and(|p| p.matches(size_bytes, modified));

    struct Fields {
        title: String,
        album: String,
        artist: String,
        album_artist: String,
        genre: Option<String>,
        year: Option<i32>,
        track_number: Option<u32>,
        duration_secs: u64,
        bitrate_kbps: Option<u32>,
        isrc: Option<String>,
        replay_gain: crate::model::ReplayGain,
        embedded_lyrics: Option<String>,
        external_lyrics_path: Option<PathBuf>,
        has_embedded_cover: bool,
        external_cover_path: Option<PathBuf>,
    }

    let fields = if reuse {
        let p = prior.unwrap();
        Fields {
            title: p.title.clone(),
            album: p.album.clone(),
            artist: p.artist.clone(),
            album_artist: p.album_artist.clone(),
            genre: p.genre.clone(),
            year: (p.year != 0).then_some(p.year),
            track_number: (p.track != 0).then_some(p.track),
            duration_secs: p.duration_secs,
            bitrate_kbps: p.bitrate_kbps,
            isrc: p.isrc.clone(),
            replay_gain: p.replay_gain,
            embedded_lyrics: p.embedded_lyrics.clone(),
            external_lyrics_path: p.external_lyrics_path.clone(),
            has_embedded_cover: p.has_embedded_cover,
            external_cover_path: p.external_cover_path.clone(),
        }
    } else {
        let parsed = match tags::read(audio_path) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("unparseable tags for {}: {e}", audio_path.display());
                return None;
            }
        };
        let external_lyrics_path = tags::find_external_lyrics(audio_path)
            .map(|p| to_relative(root, &p));
        Fields {
            title: parsed.title,
            album: parsed.album,
            artist: parsed.artist,
            album_artist: parsed.album_artist,
            genre: parsed.genre,
            year: parsed.year,
            track_number: parsed.track_number,
            duration_secs: parsed.duration_secs,
            bitrate_kbps: parsed.bitrate_kbps,
            isrc: parsed.isrc,
            replay_gain: parsed.replay_gain,
            embedded_lyrics: parsed.embedded_lyrics,
            external_lyrics_path,
            has_embedded_cover: parsed.has_embedded_picture,
            external_cover_path: None,
        }
    };

    let (suffix, content_type) = tags::suffix_and_content_type(audio_path);

    // External sidecar lyrics take precedence over embedded text (§3).
    let lyrics = if let Some(ext_path) = &fields.external_lyrics_path {
        Some(Lyrics {
            source_path: ext_path.clone(),
            is_embedded: false,
            embedded_text: None,
        })
    } else if fields.embedded_lyrics.is_some() {
        Some(Lyrics {
            source_path: relative_path.clone(),
            is_embedded: true,
            embedded_text: fields.embedded_lyrics.clone(),
        })
    } else {
        None
    };

    let cover_art = resolve_cover(
        audio_path,
        &relative_path,
        root,
        reuse,
        fields.has_embedded_cover,
        fields.external_cover_path.as_deref(),
        cover_cache,
    );

    let modified_iso = system_time_to_iso8601(modified);
    let song_id = id::song_id(&relative_path.to_string_lossy(), &modified_iso);

    let song = Song {
        id: song_id,
        path: audio_path.to_path_buf(),
        title: fields.title,
        album: fields.album,
        album_artist: fields.album_artist,
        artist: fields.artist,
        genre: fields.genre,
        track_number: fields.track_number,
        year: fields.year,
        duration_secs: fields.duration_secs,
        size_bytes,
        bitrate_kbps: fields.bitrate_kbps,
        suffix,
        content_type,
        isrc: fields.isrc,
        replay_gain: fields.replay_gain,
        lyrics,
        cover_art,
        created,
        album_id: None,
        artist_id: None,
        parent_id: None,
    };

    Some((song, modified))
}

/// Classify and (if needed) cache a song's cover art (§4.G). On reuse, the
/// prior scan's classification is trusted; bytes are only re-derived from
/// the source when the disk cache turns out to be missing or stale.
fn resolve_cover(
    audio_path: &Path,
    relative_path: &Path,
    root: &Path,
    reuse: bool,
    prior_has_embedded_cover: bool,
    prior_external_cover_path: Option<&Path>,
    cover_cache: Option<&CoverCache>,
) -> Option<CoverArt> {
    struct Classified {
        is_embedded: bool,
        relative_key: PathBuf,
        absolute_path: PathBuf,
        bytes: Option<Vec<u8>>,
    }

    let classified = if reuse {
        if prior_has_embedded_cover {
            Classified {
                is_embedded: true,
                relative_key: relative_path.to_path_buf(),
                absolute_path: audio_path.to_path_buf(),
                bytes: None,
            }
        } else {
            let relative_key = prior_external_cover_path?.to_path_buf();
            let absolute_path = root.join(&relative_key);
            Classified {
                is_embedded: false,
                relative_key,
                absolute_path,
                bytes: None,
            }
        }
    } else {
        let resolved = cover::resolve_source(audio_path)?;
        let relative_key = if resolved.is_embedded {
            relative_path.to_path_buf()
        } else {
            to_relative(root, &resolved.source_path)
        };
        Classified {
            is_embedded: resolved.is_embedded,
            relative_key,
            absolute_path: resolved.source_path,
            bytes: Some(resolved.data),
        }
    };

    let source_modified = std::fs::metadata(&classified.absolute_path)
        .and_then(|m| m.modified())
        .ok()?;
    let cover_id = id::cover_id(&classified.relative_key.to_string_lossy());
    let cache_path = cover_cache
        .map(|c| c.cache_path(&cover_id))
        .unwrap_or_default();

    if let Some(cache) = cover_cache {
        if !cache.is_fresh(&cover_id, source_modified) {
            let bytes = classified
                .bytes
                .or_else(|| cover::resolve_source(audio_path).map(|r| r.data));
            if let Some(data) = bytes {
                if let Err(e) = cache.put(&cover_id, &data, source_modified) {
                    tracing::debug!("cover cache write failed for {cover_id}: {e}");
                }
            }
        }
    }

    Some(CoverArt {
        id: cover_id,
        source_path: classified.absolute_path,
        is_embedded: classified.is_embedded,
        source_modified,
        cache_path,
    })
}

/// Build the persistent scan record (§4.C) from a freshly published
/// snapshot, so the next scan can decide reuse vs. reparse per file.
fn build_scan_record(
    snapshot: &CatalogSnapshot,
    root: &Path,
    modified_by_id: &HashMap<String, SystemTime>,
) -> ScanRecord {
    let songs = snapshot
        .songs
        .values()
        .map(|song| {
            let modified = modified_by_id
                .get(&song.id)
                .copied()
                .unwrap_or(song.created);

            let (embedded_lyrics, external_lyrics_path) = match &song.lyrics {
                Some(l) if l.is_embedded => (l.embedded_text.clone(), None),
                Some(l) => (None, Some(l.source_path.clone())),
                None => (None, None),
            };
            let (has_embedded_cover, external_cover_path) = match &song.cover_art {
                Some(c) if c.is_embedded => (true, None),
                Some(c) => (false, Some(to_relative(root, &c.source_path))),
                None => (false, None),
            };

            ScanRecordSong {
                relative_path: to_relative(root, &song.path),
                size_bytes: song.size_bytes,
                created: system_time_to_iso8601(song.created),
                modified: system_time_to_iso8601(modified),
                title: song.title.clone(),
                album: song.album.clone(),
                artist: song.artist.clone(),
                album_artist: song.album_artist.clone(),
                genre: song.genre.clone(),
                year: song.year.unwrap_or(0),
                track: song.track_number.unwrap_or(0),
                duration_secs: song.duration_secs,
                bitrate_kbps: song.bitrate_kbps,
                embedded_lyrics,
                external_lyrics_path,
                has_embedded_cover,
                external_cover_path,
                isrc: song.isrc.clone(),
                replay_gain: song.replay_gain,
            }
        })
        .collect();

    let playlists = snapshot
        .playlists
        .values()
        .map(|playlist| ScanRecordPlaylist {
            relative_path: to_relative(root, &playlist.path),
            name: playlist.name.clone(),
            comment: playlist.comment.clone(),
            entries: playlist
                .items
                .iter()
                .filter_map(|item| {
                    let song = snapshot.get_song(&item.song_id)?;
                    Some(ScanRecordPlaylistEntry {
                        relative_path: to_relative(root, &song.path),
                        added_date: Some(system_time_to_iso8601(item.added_date)),
                    })
                })
                .collect(),
        })
        .collect();

    let missing_playlist_items = snapshot
        .missing_playlist_items
        .iter()
        .map(|m| MissingPlaylistItemRecord {
            playlist_name: m.playlist_name.clone(),
            playlist_relative_path: snapshot
                .playlists
                .get(&m.playlist_id)
                .map(|p| to_relative(root, &p.path))
                .unwrap_or_default(),
            relative_path: m.relative_path.clone(),
            added_date: m.added_date.map(system_time_to_iso8601),
        })
        .collect();

    let invalid_playlists = snapshot
        .invalid_playlists
        .iter()
        .map(|p| InvalidPlaylistRecord {
            relative_path: to_relative(root, &p.path),
            reason: p.reason.clone(),
        })
        .collect();

    ScanRecord {
        songs,
        playlists,
        missing_playlist_items,
        invalid_playlists,
    }
}
