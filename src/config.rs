// src/config.rs

//! Configuration loading utilities.
//!
//! This module provides convenience functions for loading configuration
//! and seed data from a storage directory:
//!
//! ```text
//! {base}/
//! ├── config.toml          # optional; defaults when missing
//! ├── institutions.toml    # seed (path set by paths.seed_file)
//! └── output/              # snapshots (path set by paths.output_dir)
//! ```

use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::{Config, Seed};

/// Config file name inside the storage directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Load configuration from a TOML file.
///
/// A missing file falls back to defaults; a malformed one is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        log::warn!("No config at {path:?}, using defaults.");
        return Ok(Config::default());
    }
    let config = Config::load(path)?;
    config
        .validate()
        .map_err(|e| AppError::config(format!("Invalid config {path:?}: {e}")))?;
    Ok(config)
}

/// Load and validate seed data from a TOML file.
pub fn load_seed(path: &Path) -> Result<Seed> {
    let seed = Seed::load(path)
        .map_err(|e| AppError::config(format!("Failed to load seed from {path:?}: {e}")))?;
    seed.validate()
        .map_err(|e| AppError::config(format!("Invalid seed data: {e}")))?;
    Ok(seed)
}

/// Load and validate both config and seed data.
pub fn load_all(base_path: &Path) -> Result<(Config, Seed)> {
    let config = load_config(&base_path.join(CONFIG_FILE))?;
    let seed = load_seed(&config.seed_path(base_path))?;
    Ok((config, seed))
}
