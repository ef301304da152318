//! Config and environment commands.

use tokio::runtime::Runtime;

use crate::config::{self, Config};
use crate::player::list_audio_devices;

/// Print the config location and the effective settings
pub fn cmd_config(rt: &Runtime, effective: &Config, init: bool) -> anyhow::Result<()> {
    let path = config::config_path();
    match &path {
        Some(path) if path.exists() => println!("Config file: {}", path.display()),
        Some(path) => println!("Config file: {} (not created yet)", path.display()),
        None => println!("Config file: <no config directory on this system>"),
    }

    if init {
        match &path {
            Some(path) if path.exists() => {
                println!("Config file already exists; leaving it unchanged.");
            }
            _ => {
                let written = rt.block_on(config::save_async(Config::default()))?;
                println!("Wrote default config to {}", written.display());
            }
        }
    }

    // Never echo the key itself
    let mut shown = effective.clone();
    if shown.backend.anon_key.is_some() {
        shown.backend.anon_key = Some("<set>".to_string());
    }
    println!("\n{}", toml::to_string_pretty(&shown)?);
    Ok(())
}

/// List audio output devices
pub fn cmd_devices() -> anyhow::Result<()> {
    let devices = list_audio_devices()?;
    if devices.is_empty() {
        println!("No audio output devices found.");
    }
    for name in devices {
        println!("{}", name);
    }
    Ok(())
}
