//! Command handler modules for the `shop` CLI.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod order;
pub mod product;

use anyhow::Result;
use shop_config::{report_unused_keys, resolve_database_url, Settings, UnusedKeyPolicy};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Layered settings from `--config` paths; defaults when none are given.
pub fn load_settings(config_paths: &[String]) -> Result<Settings> {
    if config_paths.is_empty() {
        return Ok(Settings::default());
    }

    let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = shop_config::load_layered_yaml(&path_refs)?;

    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !report.is_clean() {
        eprintln!(
            "WARN: CONFIG_UNUSED_KEYS unused_leaf_keys={}",
            report.unused_leaf_pointers.len()
        );
        for p in report.unused_leaf_pointers.iter().take(50) {
            eprintln!("  unused={}", p);
        }
    }

    Settings::from_config_json(&loaded.config_json)
}

pub async fn connect(settings: &Settings) -> Result<PgPool> {
    let url = resolve_database_url(settings)?;
    tracing::debug!(
        url_env = %settings.database.url_env,
        max_connections = settings.database.max_connections,
        "connecting"
    );
    shop_db::connect(url.expose(), settings.database.max_connections).await
}
