//! Where configuration and logs live on disk.

use std::path::PathBuf;

/// Application name for XDG directory resolution.
const APP_NAME: &str = "switchboard";

/// Overrides the config directory (tests and sandboxed installs).
pub const CONFIG_DIR_ENV: &str = "SWITCHBOARD_CONFIG_DIR";

/// Get the XDG config directory for switchboard.
///
/// Checks `SWITCHBOARD_CONFIG_DIR` first, then falls back to the platform
/// default (`~/.config/switchboard` on Linux).
pub fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Directory for rolling log files.
pub fn log_dir() -> PathBuf {
    xdg_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}
