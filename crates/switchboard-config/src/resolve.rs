//! Turning a context plus environment into connection settings.
//!
//! Environment variables win over the file. Anything still missing after
//! both are consulted is a configuration error.

use switchboard_ws::{Credential, WsSettings, http_to_ws_url};

use crate::client::{AuthConfig, ClientConfig, Context};
use crate::settings::SyncSettings;
use crate::{ConfigError, Result};

pub const SERVER_URL_ENV: &str = "SWITCHBOARD_SERVER_URL";
pub const TENANT_ID_ENV: &str = "SWITCHBOARD_TENANT_ID";
pub const API_KEY_ENV: &str = "SWITCHBOARD_API_KEY";
pub const PARTICIPANT_ID_ENV: &str = "SWITCHBOARD_PARTICIPANT_ID";

/// Name given to the implicit context when none is configured.
const ENV_CONTEXT: &str = "environment";

/// Values taken from the process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub server_url: Option<String>,
    pub tenant_id: Option<String>,
    pub api_key: Option<String>,
    pub participant_id: Option<String>,
}

impl EnvOverrides {
    /// Read the `SWITCHBOARD_*` variables. Empty values count as unset.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            server_url: var(SERVER_URL_ENV),
            tenant_id: var(TENANT_ID_ENV),
            api_key: var(API_KEY_ENV),
            participant_id: var(PARTICIPANT_ID_ENV),
        }
    }
}

/// Everything needed to open a session.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    /// Context the settings came from.
    pub context: String,
    pub server_url: String,
    pub tenant_id: String,
    pub participant_id: String,
    pub credential: Credential,
}

impl ConnectionSettings {
    /// Transport settings, with reconnect bounds from `sync`.
    pub fn ws_settings(&self, sync: &SyncSettings) -> WsSettings {
        WsSettings::new(self.server_url.clone())
            .with_tenant(self.tenant_id.clone())
            .with_credential(self.credential.clone())
            .with_reconnect(sync.reconnect_attempts, sync.reconnect_delay())
    }
}

impl ClientConfig {
    /// Resolve connection settings for `context` (or the current context).
    ///
    /// With no context configured at all, the environment alone may supply
    /// everything.
    pub fn resolve(&self, context: Option<&str>, env: &EnvOverrides) -> Result<ConnectionSettings> {
        let implicit;
        let ctx: &Context = match context.or(self.current_context.as_deref()) {
            Some(name) => self
                .get_context(name)
                .ok_or_else(|| ConfigError::ContextNotFound(name.to_string()))?,
            None => {
                implicit = Context::new(ENV_CONTEXT, "");
                &implicit
            }
        };

        let server_url = pick(env.server_url.as_ref(), Some(&ctx.server))
            .ok_or_else(|| missing("server", ctx, SERVER_URL_ENV))?;
        http_to_ws_url(&server_url).map_err(|e| ConfigError::InvalidServerUrl {
            url: server_url.clone(),
            reason: e.to_string(),
        })?;

        let tenant_id = pick(env.tenant_id.as_ref(), ctx.tenant_id.as_ref())
            .ok_or_else(|| missing("tenant-id", ctx, TENANT_ID_ENV))?;
        let participant_id = pick(env.participant_id.as_ref(), ctx.participant_id.as_ref())
            .ok_or_else(|| missing("participant-id", ctx, PARTICIPANT_ID_ENV))?;

        let credential = match (&env.api_key, &ctx.auth) {
            (Some(key), _) => Credential::ApiKey(key.clone()),
            (None, Some(AuthConfig::None)) => Credential::None,
            (None, Some(auth @ AuthConfig::ApiKey { .. })) => {
                Credential::ApiKey(required_secret(auth, ctx)?)
            }
            (None, Some(auth @ AuthConfig::Bearer { .. })) => {
                Credential::Bearer(required_secret(auth, ctx)?)
            }
            (None, None) => {
                return Err(ConfigError::CredentialNotFound {
                    context: ctx.name.clone(),
                });
            }
        };

        Ok(ConnectionSettings {
            context: ctx.name.clone(),
            server_url,
            tenant_id,
            participant_id,
            credential,
        })
    }
}

fn pick(first: Option<&String>, second: Option<&String>) -> Option<String> {
    first
        .into_iter()
        .chain(second)
        .find(|v| !v.trim().is_empty())
        .cloned()
}

fn missing(field: &str, ctx: &Context, env_var: &str) -> ConfigError {
    ConfigError::MissingField {
        field: field.to_string(),
        context: ctx.name.clone(),
        env_var: env_var.to_string(),
    }
}

fn required_secret(auth: &AuthConfig, ctx: &Context) -> Result<String> {
    auth.resolve()?
        .ok_or_else(|| ConfigError::CredentialNotFound {
            context: ctx.name.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set_context(
            Context::new("local", "http://localhost:8080")
                .with_tenant("acme")
                .with_participant("alice")
                .with_auth(AuthConfig::None),
        );
        config.set_context(
            Context::new("prod", "https://switchboard.acme.com")
                .with_tenant("acme")
                .with_auth(AuthConfig::api_key_env("TEST_SWITCHBOARD_RESOLVE_UNSET")),
        );
        config.current_context = Some("local".to_string());
        config
    }

    #[test]
    fn test_resolve_current_context() {
        let settings = config().resolve(None, &EnvOverrides::default()).unwrap();
        assert_eq!(
            settings,
            ConnectionSettings {
                context: "local".into(),
                server_url: "http://localhost:8080".into(),
                tenant_id: "acme".into(),
                participant_id: "alice".into(),
                credential: Credential::None,
            }
        );
    }

    #[test]
    fn test_env_overrides_win() {
        let env = EnvOverrides {
            server_url: Some("http://override:9000".into()),
            tenant_id: Some("globex".into()),
            api_key: Some("env-key".into()),
            participant_id: Some("bob".into()),
        };
        let settings = config().resolve(Some("local"), &env).unwrap();
        assert_eq!(settings.server_url, "http://override:9000");
        assert_eq!(settings.tenant_id, "globex");
        assert_eq!(settings.participant_id, "bob");
        assert_eq!(settings.credential, Credential::ApiKey("env-key".into()));
    }

    #[test]
    fn test_missing_participant() {
        let err = config()
            .resolve(Some("prod"), &EnvOverrides::default())
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingField { ref field, .. } if field == "participant-id"
        ));
    }

    #[test]
    fn test_unresolvable_credential() {
        let env = EnvOverrides {
            participant_id: Some("alice".into()),
            ..Default::default()
        };
        let err = config().resolve(Some("prod"), &env).unwrap_err();
        assert!(matches!(err, ConfigError::CredentialNotFound { .. }));
    }

    #[test]
    fn test_unknown_context() {
        let err = config()
            .resolve(Some("staging"), &EnvOverrides::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::ContextNotFound(name) if name == "staging"));
    }

    #[test]
    fn test_environment_only() {
        let env = EnvOverrides {
            server_url: Some("http://localhost:8080".into()),
            tenant_id: Some("acme".into()),
            api_key: Some("k".into()),
            participant_id: Some("alice".into()),
        };
        let settings = ClientConfig::new().resolve(None, &env).unwrap();
        assert_eq!(settings.context, "environment");

        let err = ClientConfig::new()
            .resolve(None, &EnvOverrides::default())
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingField { ref field, .. } if field == "server"
        ));
    }

    #[test]
    fn test_invalid_server_url() {
        let mut config = config();
        config.set_context(
            Context::new("broken", "ftp://files.acme.com")
                .with_tenant("acme")
                .with_participant("alice")
                .with_auth(AuthConfig::None),
        );
        let err = config
            .resolve(Some("broken"), &EnvOverrides::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidServerUrl { .. }));
    }

    #[test]
    fn test_ws_settings() {
        let settings = config().resolve(None, &EnvOverrides::default()).unwrap();
        let sync = SyncSettings {
            reconnect_attempts: 7,
            reconnect_delay_ms: 250,
            ..SyncSettings::default()
        };
        let ws = settings.ws_settings(&sync);
        assert_eq!(ws.server_url, "http://localhost:8080");
        assert_eq!(ws.tenant_id.as_deref(), Some("acme"));
        assert_eq!(ws.reconnect_attempts, 7);
        assert_eq!(ws.reconnect_delay, std::time::Duration::from_millis(250));
    }
}
