//! Load configuration via `config` crate with env-override support.
//!
//! The tracker section follows the plugin schema of the host runtime: a fixed
//! template of upper-case keys that supplied values are merged over.

use std::{ops::Deref, sync::Arc};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::types::Res;

/// Key under which the cached session token is stored.
pub const COOKIE_KEY: &str = "COOKIE";

/// Default tracker URL.
fn default_url() -> String {
    "http://jira.example.com".to_string()
}

/// Default tracked project prefixes.
fn default_projects() -> Vec<String> {
    vec!["FOO".to_string(), "BAR".to_string()]
}

/// Default single-sign-on setting.
fn default_kerberos() -> bool {
    true
}

/// Default basic-auth username.
fn default_username() -> String {
    "foo".to_string()
}

/// Default basic-auth password.
fn default_password() -> String {
    "bar".to_string()
}

/// Default TLS verification setting.
fn default_ssl_verify() -> bool {
    true
}

/// The `JIRA_BOT_*` environment source; nested keys use `__`.
///
/// Values stay strings; the tracker section coerces them field by field.
fn environment() -> config::Environment {
    config::Environment::default().prefix("JIRA_BOT").prefix_separator("_").separator("__")
}

/// Configuration for the jira-bot application.
#[derive(Debug, Clone)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConfigInner {
    /// Slack app token (`SLACK_APP_TOKEN`).
    pub slack_app_token: String,
    /// Slack bot token (`SLACK_BOT_TOKEN`).
    pub slack_bot_token: String,
    /// Pre-obtained SPNEGO token sent to the handshake endpoint (`NEGOTIATE_TOKEN`).
    #[serde(default)]
    pub negotiate_token: Option<String>,
    /// Helper command printing a fresh SPNEGO token per handshake (`NEGOTIATE_COMMAND`).
    ///
    /// Takes precedence over `negotiate_token`.
    #[serde(default)]
    pub negotiate_command: Option<String>,
    /// Raw tracker plugin configuration (`TRACKER__*`).
    ///
    /// When absent, the bot runs unconfigured and never replies.
    #[serde(default)]
    pub tracker: Option<Map<String, Value>>,
}

impl Config {
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder();

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        // Environment last, so it overrides the file.
        Self::from_builder(cfg.add_source(environment()))
    }

    /// Build and validate the configuration from prepared sources.
    fn from_builder(cfg: config::ConfigBuilder<config::builder::DefaultState>) -> Res<Self> {
        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        if let Some(tracker) = result.tracker_config()? {
            let url = reqwest::Url::parse(&tracker.url).map_err(|e| anyhow::anyhow!("Tracker URL `{}` is invalid: {}", tracker.url, e))?;

            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(anyhow::anyhow!("Tracker URL must use http or https."));
            }
        }

        Ok(result)
    }

    /// Build the tracker configuration by merging the supplied section over the template.
    ///
    /// Returns `None` when no tracker section was supplied at all.
    pub fn tracker_config(&self) -> Res<Option<TrackerConfig>> {
        self.tracker.as_ref().map(|supplied| TrackerConfig::configure(Some(supplied))).transpose()
    }
}

/// Tracker plugin configuration.
///
/// Immutable once built; see [`TrackerConfig::configure`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Base URL of the tracker service.
    #[serde(rename = "URL", default = "default_url", deserialize_with = "lenient_string")]
    pub url: String,
    /// Project prefixes to look for in messages, e.g. `FOO` for `FOO-123`.
    #[serde(rename = "PROJECTS", default = "default_projects", deserialize_with = "lenient_list")]
    pub projects: Vec<String>,
    /// Use the negotiated single-sign-on handshake instead of basic auth.
    #[serde(rename = "KERBEROS", default = "default_kerberos", deserialize_with = "lenient_bool")]
    pub kerberos: bool,
    #[serde(rename = "USERNAME", default = "default_username", deserialize_with = "lenient_string")]
    pub username: String,
    #[serde(rename = "PASSWORD", default = "default_password", deserialize_with = "lenient_string")]
    pub password: String,
    /// Verify the tracker's TLS certificate.
    #[serde(rename = "SSL_VERIFY", default = "default_ssl_verify", deserialize_with = "lenient_bool")]
    pub ssl_verify: bool,
    /// Keys the bot does not recognize; kept as supplied.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            projects: default_projects(),
            kerberos: default_kerberos(),
            username: default_username(),
            password: default_password(),
            ssl_verify: default_ssl_verify(),
            extra: Map::new(),
        }
    }
}

impl TrackerConfig {
    /// The default configuration schema, as presented to the host.
    pub fn template() -> Map<String, Value> {
        match serde_json::to_value(Self::default()) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Merge `supplied` over the template.
    ///
    /// Recognized keys match case-insensitively (`useSingleSignOn` is an alias of
    /// `KERBEROS`); anything else is carried over untouched. An absent or empty
    /// supplied map yields the template.
    pub fn configure(supplied: Option<&Map<String, Value>>) -> Res<Self> {
        let mut merged = Self::template();

        for (key, value) in supplied.into_iter().flatten() {
            merged.insert(canonical_key(key), value.clone());
        }

        Ok(serde_json::from_value(Value::Object(merged))?)
    }

    /// The base URL without trailing slashes.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

/// Map a supplied key onto the template's spelling, if it names a known setting.
fn canonical_key(key: &str) -> String {
    let upper = key.to_ascii_uppercase();

    match upper.as_str() {
        "URL" | "PROJECTS" | "KERBEROS" | "USERNAME" | "PASSWORD" | "SSL_VERIFY" => upper,
        "USESINGLESIGNON" => "KERBEROS".to_string(),
        _ => key.to_string(),
    }
}

/// Accept booleans as either JSON booleans or strings, since environment overrides arrive as text.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            other => Err(serde::de::Error::custom(format!("invalid boolean `{other}`"))),
        },
        other => Err(serde::de::Error::custom(format!("invalid boolean `{other}`"))),
    }
}

/// Accept strings, numbers, and booleans as text (e.g. `PASSWORD = 123456`).
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid string `{other}`"))),
    }
}

/// Accept a list, or a comma-separated string as environment overrides provide.
fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(serde::de::Error::custom(format!("invalid list item `{other}`"))),
            })
            .collect(),
        Value::String(s) => Ok(s.split(',').map(str::trim).filter(|p| !p.is_empty()).map(str::to_string).collect()),
        other => Err(serde::de::Error::custom(format!("invalid list `{other}`"))),
    }
}
