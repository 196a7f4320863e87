use std::fs;
use std::path::PathBuf;

use log::{info, warn};

use crate::types::AppResult;
use crate::types::config::get_config_filename;

const EXAMPLE_CONFIG: &str = include_str!("../../example.toml");

pub async fn execute_init() -> AppResult<()> {
    let config_filename = get_config_filename();
    let cfg_path = PathBuf::from(config_filename);
    if cfg_path.exists() {
        warn!("{config_filename} already exists; leaving it unchanged");
        return Ok(());
    }
    fs::write(&cfg_path, EXAMPLE_CONFIG)?;
    info!("Created {}", cfg_path.display());
    info!("Set [compiler].mutated and [compiler].tracking before starting a campaign.");
    Ok(())
}
