//! Command-line front door for the catalog engine.
//!
//! The three wire protocols a real deployment speaks (Subsonic, Jellyfin,
//! an internal REST API) are out of scope for this crate; this binary is a
//! thin operator tool over the library crate — trigger a scan, inspect the
//! catalog, and mutate playlists from a terminal — in the same spirit as
//! the teacher's `cli::commands` module (one `clap::Subcommand` per
//! operation, a `tokio::runtime::Runtime` built once in `main`).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use music_minder::catalog::Catalog;
use music_minder::{config, playlist_mutator, scanner};
use tokio::runtime::Runtime;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(author, version, about = "music-minder catalog engine CLI", long_about = None)]
struct Cli {
    /// Library root to scan. Overrides the configured `music_folder_path`.
    #[arg(long, global = true, env = "MUSIC_MINDER_ROOT")]
    music_folder_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the library root and print summary counts.
    Scan,
    /// List every song in the catalog.
    Songs,
    /// List every album in the catalog.
    Albums,
    /// List every artist in the catalog.
    Artists,
    /// List genres, ordinal-sorted.
    Genres,
    /// Case-insensitive search across artists, albums, and songs.
    Search {
        query: String,
    },
    /// List playlists, including the computed virtual ones.
    Playlists,
    /// Create a new playlist.
    PlaylistCreate {
        name: String,
        #[arg(long)]
        comment: Option<String>,
        /// Song IDs to include, in order.
        #[arg(long = "song")]
        song_ids: Vec<String>,
    },
    /// Rename an existing playlist.
    PlaylistRename {
        id: String,
        new_name: String,
    },
    /// Delete a playlist.
    PlaylistDelete {
        id: String,
    },
    /// Print a song's lyrics (embedded or external `.lrc`).
    Lyrics {
        song_id: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::from_default_env().add_directive("music_minder=info".parse().unwrap()))
        .init();

    let cli = Cli::parse();
    let rt = Runtime::new()?;
    rt.block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = config::load();
    if let Some(root) = cli.music_folder_path {
        config.music_folder_path = root;
    }
    if config.music_folder_path.as_os_str().is_empty() {
        anyhow::bail!("no music folder configured; pass --music-folder-path or set it in config.toml");
    }

    let catalog = Catalog::new(config.music_folder_path.clone());
    scanner::trigger(&catalog, &config).await;

    let status = catalog.status();
    if !status.is_initial_scan_completed {
        anyhow::bail!("scan did not complete");
    }

    match cli.command {
        Commands::Scan => {
            let snapshot = catalog.snapshot();
            println!(
                "scanned {}: {} songs, {} albums, {} artists, {} playlists",
                config.music_folder_path.display(),
                snapshot.songs.len(),
                snapshot.albums.len(),
                snapshot.artists.len(),
                snapshot.playlists.len(),
            );
        }
        Commands::Songs => {
            let snapshot = catalog.snapshot();
            for song in snapshot.songs.values() {
                println!("{}\t{} - {} - {}", song.id, song.artist, song.album, song.title);
            }
        }
        Commands::Albums => {
            let snapshot = catalog.snapshot();
            for album in snapshot.albums.values() {
                println!("{}\t{} - {} ({} tracks)", album.id, album.artist_name, album.name, album.song_count);
            }
        }
        Commands::Artists => {
            let snapshot = catalog.snapshot();
            for artist in snapshot.artists.values() {
                println!("{}\t{} ({} albums)", artist.id, artist.name, artist.album_count());
            }
        }
        Commands::Genres => {
            for genre in catalog.snapshot().genres() {
                println!("{genre}");
            }
        }
        Commands::Search { query } => {
            let results = catalog.snapshot().search_all(&query);
            for artist in &results.artists {
                println!("artist\t{}\t{}", artist.id, artist.name);
            }
            for album in &results.albums {
                println!("album\t{}\t{} - {}", album.id, album.artist_name, album.name);
            }
            for song in &results.songs {
                println!("song\t{}\t{} - {}", song.id, song.artist, song.title);
            }
        }
        Commands::Playlists => {
            for playlist in catalog.snapshot().list_playlists() {
                println!("{}\t{}\t{} items", playlist.id, playlist.name, playlist.items.len());
            }
        }
        Commands::PlaylistCreate { name, comment, song_ids } => {
            let playlist = playlist_mutator::create(&catalog, &name, comment, &song_ids)
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            println!("created {}\t{}", playlist.id, playlist.name);
        }
        Commands::PlaylistRename { id, new_name } => {
            let playlist = playlist_mutator::rename(&catalog, &id, &new_name)
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            println!("renamed to {}\t{}", playlist.id, playlist.name);
        }
        Commands::PlaylistDelete { id } => {
            playlist_mutator::delete(&catalog, &id)
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            println!("deleted {id}");
        }
        Commands::Lyrics { song_id } => match catalog.get_lyrics(&song_id) {
            Ok(Some(text)) => println!("{text}"),
            Ok(None) => println!("(no lyrics)"),
            Err(e) => anyhow::bail!("{e}"),
        },
    }

    Ok(())
}
