//! Generic configuration I/O utilities
//!
//! YAML loading and saving for any serializable configuration type.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Load configuration from a YAML file that must exist
///
/// A missing, unreadable or malformed file is an error.
///
/// # Example
///
/// ```ignore
/// let config: HarnessConfig = load_config(Path::new("config.yaml"))?;
/// ```
pub fn load_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    log::info!("load_config: Loading from {:?}", path);

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let config = serde_yaml::from_str::<T>(&contents)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    log::info!("load_config: Loaded config from {:?}", path);
    Ok(config)
}

/// Load configuration from an optional YAML file
///
/// Only a missing file falls back to the default config; a file that exists
/// but can't be read or parsed is still an error.
pub fn load_config_or_default<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match std::fs::metadata(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("load_config: {:?} doesn't exist, using defaults", path);
            Ok(T::default())
        }
        _ => load_config(path),
    }
}

/// Save configuration to a YAML file
///
/// Creates parent directories if they don't exist.
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    log::info!("save_config: Saving to {:?}", path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;

    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    log::info!("save_config: Config saved");
    Ok(())
}
