//! soundshelf - the playback core of a music catalog.
//!
//! One shared audio element, one coordinator that turns "play track X"
//! into "the element is loading/playing X", and observers that turn
//! playback signals into now-playing state. The CLI drives it headless.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod player;
#[cfg(test)]
pub mod test_utils;
pub mod ui;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging; RUST_LOG replaces the defaults entirely
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn,soundshelf=info"))?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    cli::run_command(&args)
}
