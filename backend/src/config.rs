//! Gateway configuration.

use std::collections::HashSet;

use config::{Config as ConfigLoader, Environment, File, FileFormat};
use janus_common::{Group, Rule};
use serde::Deserialize;

use crate::platform::mailgun::DEFAULT_API_BASE;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "./config/janus-config.toml";

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gitlab: GitlabConfig,
    #[serde(default)]
    pub mattermost: MattermostConfig,
    #[serde(default)]
    pub mailgun: MailgunConfig,
    pub oidc: OidcConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub provisioner: ProvisionerConfig,
    #[serde(default)]
    pub useradmin: UserAdminConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitlabConfig {
    #[serde(default = "default_gitlab_url")]
    pub base_url: String,
    /// Admin personal access token. Set it through `JANUS__GITLAB__TOKEN`.
    #[serde(default)]
    pub token: String,
}

impl Default for GitlabConfig {
    fn default() -> Self {
        Self {
            base_url: default_gitlab_url(),
            token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MattermostConfig {
    #[serde(default = "default_mattermost_url")]
    pub base_url: String,
    /// Set it through `JANUS__MATTERMOST__TOKEN`.
    #[serde(default)]
    pub token: String,
    /// Link new chat accounts to their GitLab identity instead of giving
    /// them a local password.
    #[serde(default = "default_true")]
    pub use_sso: bool,
}

impl Default for MattermostConfig {
    fn default() -> Self {
        Self {
            base_url: default_mattermost_url(),
            token: String::new(),
            use_sso: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailgunConfig {
    #[serde(default = "default_mailgun_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub domain: String,
    /// Set it through `JANUS__MAILGUN__API_KEY`.
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub from_addr: String,
}

impl Default for MailgunConfig {
    fn default() -> Self {
        Self {
            api_base: default_mailgun_api_base(),
            domain: String::new(),
            api_key: String::new(),
            from_addr: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OidcConfig {
    /// Issuer URL; its discovery document points at the endpoints and JWKS.
    pub issuer: String,
    /// OAuth application id, also the expected `aud` claim. Audience is not
    /// checked and browser sign-in is off when unset.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Set it through `JANUS__OIDC__CLIENT_SECRET`.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Absolute URL of `/auth/callback` as registered with the provider.
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default = "default_oidc_scope")]
    pub scope: String,
    /// Key for signing session cookies. A random key is generated at start
    /// when unset, so sessions do not survive a restart.
    #[serde(default)]
    pub session_secret: Option<String>,
    #[serde(default = "default_session_hours")]
    pub session_hours: u64,
    /// Group required to use the admin pages.
    #[serde(default = "default_admin_group")]
    pub admin_group: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Rules and identifiers for provisioning new users.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvisionerConfig {
    /// GitLab group (id or path) every new user joins. Empty to skip.
    #[serde(default)]
    pub gitlab_group: String,
    /// GitLab project (id or path) every new user joins. Empty to skip.
    #[serde(default)]
    pub gitlab_project: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub mailgun_welcome_template: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserAdminConfig {
    /// Mount point of the admin pages, without trailing slash.
    #[serde(default = "default_admin_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub groups: Vec<Group>,
}

impl Default for UserAdminConfig {
    fn default() -> Self {
        Self {
            prefix: default_admin_prefix(),
            groups: Vec::new(),
        }
    }
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3149
}
fn default_gitlab_url() -> String {
    "http://127.0.0.1:8929/".to_string()
}
fn default_mattermost_url() -> String {
    "http://127.0.0.1:8065/".to_string()
}
fn default_mailgun_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}
fn default_admin_group() -> String {
    "management".to_string()
}
fn default_oidc_scope() -> String {
    "openid profile".to_string()
}
fn default_session_hours() -> u64 {
    12
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_admin_prefix() -> String {
    "/user/admin".to_string()
}
fn default_true() -> bool {
    true
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("loading configuration file {path:?}: {source}")]
    Load {
        path: String,
        #[source]
        source: config::ConfigError,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Load configuration from a TOML file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (JANUS__SECTION__KEY format)
    /// 2. The TOML file at `path`, which must exist
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let loaded = ConfigLoader::builder()
            .add_source(File::new(path, FileFormat::Toml).required(true))
            .add_source(
                Environment::with_prefix("JANUS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize::<Config>())
            .map_err(|source| ConfigError::Load {
                path: path.to_string(),
                source,
            })?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Parse configuration from TOML text alone, without the environment.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let loaded = ConfigLoader::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize::<Config>())
            .map_err(|source| ConfigError::Load {
                path: "<inline>".to_string(),
                source,
            })?;

        loaded.validate()?;
        Ok(loaded)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let prefix = &self.useradmin.prefix;
        if !prefix.starts_with('/') || prefix.ends_with('/') {
            return Err(ConfigError::Invalid(format!(
                "useradmin.prefix {:?} must start with '/' and have no trailing slash",
                prefix
            )));
        }

        let mut names = HashSet::new();
        for group in &self.useradmin.groups {
            if !names.insert(group.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "useradmin group {:?} is defined twice",
                    group.name
                )));
            }
        }

        Ok(())
    }
}
