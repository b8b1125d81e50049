//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration loading and resolution.
///
/// All of these are fatal for a session: no connection is attempted until
/// the configuration is fixed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to write a config file.
    #[error("failed to write config file '{path}': {source}")]
    WriteFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse YAML.
    #[error("failed to parse YAML config: {0}")]
    ParseYaml(String),

    /// Context not found.
    #[error("context '{0}' not found")]
    ContextNotFound(String),

    /// Missing required field.
    #[error("missing required field '{field}' in context '{context}' (or set {env_var})")]
    MissingField {
        field: String,
        context: String,
        env_var: String,
    },

    /// Server URL present but unusable.
    #[error("invalid server URL '{url}': {reason}")]
    InvalidServerUrl { url: String, reason: String },

    /// No credential could be found for a context that requires one.
    #[error(
        "no credential found for context '{context}'. Configure auth (or `type: none`) or set SWITCHBOARD_API_KEY"
    )]
    CredentialNotFound { context: String },

    /// Agent id not in the catalog.
    #[error("agent '{0}' not found in the agent catalog")]
    AgentNotFound(String),

    /// Two catalog entries share an id.
    #[error("agent '{0}' is defined more than once")]
    DuplicateAgent(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}
