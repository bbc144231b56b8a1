//! shop-daemon entry point.
//!
//! Thin: sets up tracing, loads settings, connects the store, wires
//! middleware, and starts the HTTP server. Route handlers live in
//! `routes.rs`; shared state in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{anyhow, Context};
use axum::http::{HeaderValue, Method};
use shop_checkout::Settlement;
use shop_config::{
    load_layered_yaml, report_unused_keys, resolve_database_url, Settings, UnusedKeyPolicy,
};
use shop_daemon::{routes, state};
use shop_db::PgOrderStore;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

const ENV_CONFIG_PATHS: &str = "SHOP_CONFIG";
const ENV_DAEMON_ADDR: &str = "SHOP_DAEMON_ADDR";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience).
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let settings = load_settings()?;
    let settlement = Settlement::parse(&settings.checkout.settlement)
        .ok_or_else(|| anyhow!("unknown settlement '{}'", settings.checkout.settlement))?;

    let url = resolve_database_url(&settings)?;
    let pool = shop_db::connect(url.expose(), settings.database.max_connections).await?;
    let db = shop_db::status(&pool).await?;
    if !db.has_orders_table {
        warn!("orders table missing; run `shop db migrate` before taking traffic");
    }

    let store = Arc::new(PgOrderStore::new(pool, settings.database.lock_timeout_ms));
    let shared = Arc::new(state::AppState::from_store(store, settlement));

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr(&settings)?;
    info!(
        settlement = settlement.as_str(),
        lock_timeout_ms = settings.database.lock_timeout_ms,
        "shop-daemon listening on http://{}",
        addr
    );

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// `SHOP_CONFIG=base.yaml,local.yaml`; no paths means defaults.
fn load_settings() -> anyhow::Result<Settings> {
    let raw = std::env::var(ENV_CONFIG_PATHS).unwrap_or_default();
    let paths: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if paths.is_empty() {
        return Ok(Settings::default());
    }

    let loaded = load_layered_yaml(&paths)?;
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    for key in &report.unused_leaf_pointers {
        warn!(key = %key, "unused config key");
    }
    info!(config_hash = %loaded.config_hash, layers = paths.len(), "config loaded");

    Settings::from_config_json(&loaded.config_json)
}

/// `SHOP_DAEMON_ADDR` wins over `daemon.bind_addr`.
fn bind_addr(settings: &Settings) -> anyhow::Result<SocketAddr> {
    let (source, raw) = match std::env::var(ENV_DAEMON_ADDR) {
        Ok(v) if !v.trim().is_empty() => (ENV_DAEMON_ADDR, v),
        _ => ("daemon.bind_addr", settings.daemon.bind_addr.clone()),
    };
    raw.trim()
        .parse()
        .with_context(|| format!("invalid {source} '{raw}'"))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; run until killed.
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(tower_http::cors::Any)
}
