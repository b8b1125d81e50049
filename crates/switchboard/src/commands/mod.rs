//! CLI command handlers.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use switchboard_config::ClientConfig;

pub mod agents;
pub mod chat;
pub mod config;
pub mod console;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Named client context, overriding `current-context`.
    pub context: Option<String>,
    /// Config directory override.
    pub config_dir: Option<PathBuf>,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Path of the client config file in effect.
    pub fn config_path(&self) -> Option<PathBuf> {
        match &self.config_dir {
            Some(dir) => Some(dir.join(switchboard_config::CLIENT_CONFIG_FILE)),
            None => switchboard_config::client_config_path(),
        }
    }

    pub fn load_config(&self) -> Result<ClientConfig> {
        let path = self.config_path();
        switchboard_config::load_client_config_from(path.as_deref()).with_context(|| {
            format!(
                "loading {}",
                path.map(|p| p.display().to_string())
                    .unwrap_or_else(|| "client config".to_string())
            )
        })
    }

    pub fn save_config(&self, config: &ClientConfig) -> Result<()> {
        let path = self
            .config_path()
            .context("could not determine config directory")?;
        switchboard_config::save_client_config_to(config, &path)?;
        Ok(())
    }
}
