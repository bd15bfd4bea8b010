//! Standard locations for jam-session configuration files

use std::path::PathBuf;

/// Get the default configuration directory
///
/// Returns: `<platform config dir>/jam-session` (e.g. `~/.config/jam-session`),
/// falling back to `./jam-session` when the platform has none.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jam-session")
}

/// Get the default path of a config file (e.g. "engine.yaml")
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}
