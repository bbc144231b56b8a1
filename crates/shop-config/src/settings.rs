//! Typed view over the merged config JSON.
//!
//! YAML stores env var NAMES for secrets (`database.url_env`); the value is
//! read once at startup through [`resolve_database_url`] and never printed.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SETTLEMENT_MODES: &[&str] = &["instant", "deferred"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    pub bind_addr: String,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Name of the env var holding the connection URL.
    pub url_env: String,
    pub max_connections: u32,
    /// Upper bound on a single row-lock wait inside checkout.
    pub lock_timeout_ms: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url_env: "SHOP_DATABASE_URL".to_string(),
            max_connections: 10,
            lock_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckoutSettings {
    /// `instant` creates paid orders, `deferred` creates pending ones.
    pub settlement: String,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            settlement: "instant".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub daemon: DaemonSettings,
    pub database: DatabaseSettings,
    pub checkout: CheckoutSettings,
}

impl Settings {
    /// Sections absent from the config take their defaults. Unknown top-level
    /// sections are left to `report_unused_keys`.
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        let s: Settings =
            serde_json::from_value(config_json.clone()).context("invalid settings")?;

        if !SETTLEMENT_MODES.contains(&s.checkout.settlement.as_str()) {
            bail!(
                "CONFIG_INVALID checkout.settlement='{}'; expected one of: {}",
                s.checkout.settlement,
                SETTLEMENT_MODES.join(" | ")
            );
        }
        if s.database.max_connections == 0 {
            bail!("CONFIG_INVALID database.max_connections must be > 0");
        }
        if s.database.url_env.trim().is_empty() {
            bail!("CONFIG_INVALID database.url_env must name an env var");
        }
        Ok(s)
    }
}

// ---------------------------------------------------------------------------
// Secret resolution
// ---------------------------------------------------------------------------

/// Resolved connection URL. **Redacted in `Debug` output.**
#[derive(Clone)]
pub struct DatabaseUrl(String);

impl DatabaseUrl {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for DatabaseUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DatabaseUrl(<REDACTED>)")
    }
}

/// Read the env var named by `database.url_env`.
///
/// Errors name the variable, never its value.
pub fn resolve_database_url(settings: &Settings) -> Result<DatabaseUrl> {
    let name = settings.database.url_env.trim();
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(DatabaseUrl(v)),
        _ => bail!("SECRETS_MISSING: required env var '{name}' (database url) is not set or empty"),
    }
}
