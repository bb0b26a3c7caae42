use anyhow::Result;
use std::path::PathBuf;

use crate::config::{expand_path, get_default_config_path, SweepConfig};
use crate::log;

pub fn handle_init_command(path: &Option<PathBuf>) -> Result<()> {
    let path = match path {
        Some(path) => expand_path(path),
        None => get_default_config_path()?,
    };

    if path.exists() {
        log::print_info(&format!("Configuration already exists at {}", path.display()));
        return Ok(());
    }

    SweepConfig::create_default_at(&path)?;
    log::print_info(&format!("✓ Default configuration written to {}", path.display()));
    log::print_message("Fill in [identity] (and [miner] for the miner) before starting a process.");
    Ok(())
}
