//! Tracker configuration from the environment.

use anyhow::Context;

pub const DATABASE_URL_VAR: &str = "PLAYTIME_DATABASE_URL";
pub const ENABLED_VAR: &str = "PLAYTIME_ENABLED";
pub const DEBUG_VAR: &str = "PLAYTIME_DEBUG";

pub const DEFAULT_DATABASE_URL: &str = "sqlite:playtime.db";

#[derive(Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// `sqlite:` URL, `mysql://` URL, or `Server=..;Database=..;` string.
    pub database_url: String,
    pub enabled: bool,
    /// Raises log verbosity only.
    pub debug: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            enabled: true,
            debug: false,
        }
    }
}

// The URL may carry a password.
impl std::fmt::Debug for TrackerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerConfig")
            .field("database_url", &"<redacted>")
            .field("enabled", &self.enabled)
            .field("debug", &self.debug)
            .finish()
    }
}

impl TrackerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (used by `from_env` and tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup(DATABASE_URL_VAR)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let enabled = match lookup(ENABLED_VAR) {
            Some(raw) => parse_bool(&raw).with_context(|| format!("reading {ENABLED_VAR}"))?,
            None => true,
        };
        let debug = match lookup(DEBUG_VAR) {
            Some(raw) => parse_bool(&raw).with_context(|| format!("reading {DEBUG_VAR}"))?,
            None => false,
        };

        Ok(Self {
            database_url,
            enabled,
            debug,
        })
    }

    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub fn default_log_filter(&self) -> &'static str {
        if self.debug {
            "playtime_engine=debug"
        } else {
            "playtime_engine=info"
        }
    }
}

fn parse_bool(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got `{other}`"),
    }
}
