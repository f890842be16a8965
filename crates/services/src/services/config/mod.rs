use std::path::Path;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Overrides `mail.api_token` from the file when set.
pub const MAIL_API_TOKEN_ENV: &str = "BOARD_MAIL_API_TOKEN";

fn default_from_address() -> String {
    "noreply@openflow.world".to_string()
}

fn default_app_url() -> String {
    "https://app.openflow.world".to_string()
}

fn default_limit() -> i64 {
    50
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MailConfig {
    /// When false, emails are logged instead of sent.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_from_address")]
    pub from_address: String,
    /// HTTP endpoint accepting JSON messages.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(
        default,
        serialize_with = "serialize_secret",
        deserialize_with = "deserialize_secret"
    )]
    pub api_token: Option<SecretString>,
    /// Linked from notification emails.
    #[serde(default = "default_app_url")]
    pub app_url: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            from_address: default_from_address(),
            endpoint: None,
            api_token: None,
            app_url: default_app_url(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mail: MailConfig,
    /// Entries returned by change history queries.
    #[serde(default = "default_limit")]
    pub history_limit: i64,
    /// Notifications returned by the recent-notifications query.
    #[serde(default = "default_limit")]
    pub notification_limit: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mail: MailConfig::default(),
            history_limit: default_limit(),
            notification_limit: default_limit(),
        }
    }
}

impl Config {
    fn apply_env_overrides(mut self) -> Self {
        if let Ok(token) = std::env::var(MAIL_API_TOKEN_ENV)
            && !token.trim().is_empty()
        {
            self.mail.api_token = Some(SecretString::from(token));
        }
        self
    }
}

fn serialize_secret<S>(value: &Option<SecretString>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    value
        .as_ref()
        .map(|secret| secret.expose_secret())
        .serialize(serializer)
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|t| !t.is_empty()).map(SecretString::from))
}

/// Will always return config, falling back to defaults when the file is missing
/// or unparseable.
pub async fn load_config_from_file(config_path: &Path) -> Config {
    let config = match std::fs::read_to_string(config_path) {
        Ok(raw_config) => match serde_json::from_str::<Config>(&raw_config) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    path = %config_path.display(),
                    error = %e,
                    "Failed to parse config, using defaults"
                );
                Config::default()
            }
        },
        Err(_) => {
            tracing::info!(path = %config_path.display(), "No config file found, using defaults");
            Config::default()
        }
    };
    config.apply_env_overrides()
}

/// Saves the config to the given path
pub async fn save_config_to_file(config: &Config, config_path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let raw_config = serde_json::to_string_pretty(config)?;
    std::fs::write(config_path, raw_config)?;
    Ok(())
}
