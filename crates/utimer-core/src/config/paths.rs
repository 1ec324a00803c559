//! Standard configuration paths

use std::path::PathBuf;

/// Directory name under the user config dir
pub const CONFIG_DIR_NAME: &str = "utimer-harness";

/// Get the default config file path
///
/// Returns: `~/.config/utimer-harness/config.yaml` (or the platform equivalent),
/// falling back to the working directory when no config dir is known.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
        .join("config.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_layout() {
        let path = default_config_path();
        assert!(path.ends_with("utimer-harness/config.yaml"));
    }
}
