//! Catalog browsing commands.

use std::time::Duration;

use tokio::runtime::Runtime;

use super::{Cli, open_catalog};
use crate::catalog::TrackScope;
use crate::config::Config;
use crate::model::{Album, Playlist, TrackDescriptor};
use crate::player::{SourceResolver, format_duration};

/// List tracks, optionally limited to one album or playlist
pub fn cmd_tracks(
    rt: &Runtime,
    cli: &Cli,
    config: &Config,
    album: Option<&str>,
    playlist: Option<&str>,
) -> anyhow::Result<()> {
    let scope = match (album, playlist) {
        (Some(id), _) => TrackScope::Album(id.to_string()),
        (None, Some(id)) => TrackScope::Playlist(id.to_string()),
        (None, None) => TrackScope::All,
    };

    rt.block_on(async {
        let catalog = open_catalog(cli, config)?;
        let tracks = catalog.tracks(&scope).await?;

        if tracks.is_empty() {
            println!("No tracks found.");
            return Ok(());
        }
        for track in &tracks {
            println!("{}", track_line(track));
        }
        println!("\n{} tracks", tracks.len());
        Ok(())
    })
}

/// List albums
pub fn cmd_albums(rt: &Runtime, cli: &Cli, config: &Config) -> anyhow::Result<()> {
    rt.block_on(async {
        let albums = open_catalog(cli, config)?.albums().await?;
        if albums.is_empty() {
            println!("No albums found.");
            return Ok(());
        }
        for album in &albums {
            println!("{}", album_line(album));
        }
        println!("\n{} albums", albums.len());
        Ok(())
    })
}

/// List playlists
pub fn cmd_playlists(rt: &Runtime, cli: &Cli, config: &Config) -> anyhow::Result<()> {
    rt.block_on(async {
        let playlists = open_catalog(cli, config)?.playlists().await?;
        if playlists.is_empty() {
            println!("No playlists found.");
            return Ok(());
        }
        for playlist in &playlists {
            println!("{}", playlist_line(playlist));
        }
        println!("\n{} playlists", playlists.len());
        Ok(())
    })
}

/// Print the URL an audio reference resolves to
pub fn cmd_resolve(config: &Config, reference: &str) -> anyhow::Result<()> {
    let resolver = SourceResolver::new(config.storage.base_url.as_deref())?;
    if resolver.base().is_none() {
        tracing::info!("No [storage] base_url configured; relative references are used as-is");
    }
    println!("{}", resolver.resolve(reference)?);
    Ok(())
}

/// One row of the track listing: id, title, artist, length, audio marker.
fn track_line(track: &TrackDescriptor) -> String {
    let length = track
        .duration_secs
        .map(|s| format_duration(Duration::from_secs(u64::from(s))))
        .unwrap_or_else(|| "--:--".to_string());
    let marker = if track.is_playable() { "" } else { "  (no audio)" };
    format!(
        "{:<12} {} - {}  [{}]{}",
        track.id,
        track.title,
        track.display_artist(),
        length,
        marker
    )
}

fn album_line(album: &Album) -> String {
    let artist = if album.artist.is_empty() {
        "Unknown Artist"
    } else {
        &album.artist
    };
    match album.year {
        Some(year) => format!("{:<12} {} - {} ({})", album.id, album.title, artist, year),
        None => format!("{:<12} {} - {}", album.id, album.title, artist),
    }
}

fn playlist_line(playlist: &Playlist) -> String {
    match playlist.description.as_deref().filter(|d| !d.is_empty()) {
        Some(description) => format!("{:<12} {}  ({})", playlist.id, playlist.name, description),
        None => format!("{:<12} {}", playlist.id, playlist.name),
    }
}
