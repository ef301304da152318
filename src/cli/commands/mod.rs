//! CLI command definitions and dispatch.
//!
//! This module provides the command-line interface for soundshelf.
//! Each group of subcommands lives in its own submodule:
//! - `catalog`: Track, album and playlist listing and reference resolution
//! - `play`: Headless playback through the coordinator
//! - `config`: Config file inspection and initialisation

mod catalog;
mod config;
mod play;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::runtime::Runtime;

pub use catalog::{cmd_albums, cmd_playlists, cmd_resolve, cmd_tracks};
pub use config::{cmd_config, cmd_devices};
pub use play::cmd_play;

use crate::catalog::{Catalog, JsonCatalog, RestCatalog};
use crate::config::Config;

/// soundshelf CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Read tracks from a JSON catalog export instead of the hosted backend
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    /// Backend project URL (overrides the config file)
    #[arg(long, global = true, env = "SOUNDSHELF_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Anonymous API key (overrides the config file)
    #[arg(long, global = true, env = "SOUNDSHELF_ANON_KEY", hide_env_values = true)]
    pub anon_key: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// List tracks in the catalog
    Tracks {
        /// Only tracks of this album
        #[arg(long, conflicts_with = "playlist")]
        album: Option<String>,
        /// Only tracks of this playlist
        #[arg(long)]
        playlist: Option<String>,
    },
    /// List albums in the catalog
    Albums,
    /// List playlists in the catalog
    Playlists,
    /// Print the URL an audio reference resolves to
    Resolve {
        /// Storage path or URL, as stored on the track
        reference: String,
    },
    /// Play one track until it ends (or Ctrl-C)
    Play {
        /// Catalog id of the track
        track_id: String,
        /// Use the silent virtual output instead of the audio device
        #[arg(long = "virtual")]
        virtual_output: bool,
        /// Print playback events as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Show the config file location and effective settings
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },
    /// List audio output devices
    Devices,
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;
    let mut config = crate::config::load();
    apply_overrides(&mut config, cli);

    match &cli.command {
        Commands::Tracks { album, playlist } => {
            cmd_tracks(&rt, cli, &config, album.as_deref(), playlist.as_deref())
        }
        Commands::Albums => cmd_albums(&rt, cli, &config),
        Commands::Playlists => cmd_playlists(&rt, cli, &config),
        Commands::Resolve { reference } => cmd_resolve(&config, reference),
        Commands::Play {
            track_id,
            virtual_output,
            json,
        } => cmd_play(&rt, cli, &config, track_id, *virtual_output, *json),
        Commands::Config { init } => cmd_config(&rt, &config, *init),
        Commands::Devices => cmd_devices(),
    }
}

/// Command-line and environment values win over the config file.
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(url) = &cli.backend_url {
        config.backend.url = Some(url.clone());
    }
    if let Some(key) = &cli.anon_key {
        config.backend.anon_key = Some(key.clone());
    }
}

/// Open the catalog the user asked for: a JSON export, else the hosted backend.
pub(crate) fn open_catalog(cli: &Cli, config: &Config) -> anyhow::Result<Box<dyn Catalog>> {
    if let Some(path) = &cli.catalog {
        return Ok(Box::new(JsonCatalog::load(path)?));
    }

    let Some(url) = config.backend.url.as_deref() else {
        anyhow::bail!(
            "No catalog configured: pass --catalog <FILE> or set [backend] url (or SOUNDSHELF_BACKEND_URL)"
        );
    };
    let key = config.backend.anon_key.clone().unwrap_or_default();
    if key.is_empty() {
        tracing::warn!("No anon key configured; backend requests will likely be refused");
    }
    Ok(Box::new(RestCatalog::new(url, key)?))
}
