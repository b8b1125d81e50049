//! Configuration for Switchboard clients.
//!
//! Kubeconfig-style client configuration:
//! - Named connection contexts (server, tenant, participant and auth)
//! - `current-context` for default selection
//! - An agent catalog and engine tunables
//! - `SWITCHBOARD_*` environment overrides applied at resolution

pub mod client;
pub mod discovery;
pub mod error;
pub mod resolve;
pub mod settings;

pub use client::{
    AuthConfig, CLIENT_CONFIG_FILE, ClientConfig, Context, client_config_path, load_client_config,
    load_client_config_from, save_client_config, save_client_config_to,
};
pub use discovery::{CONFIG_DIR_ENV, log_dir, xdg_config_dir};
pub use error::{ConfigError, Result};
pub use resolve::{ConnectionSettings, EnvOverrides};
pub use settings::SyncSettings;
