//! Application entry point for the `farmsense-health` service.
//!
//! This binary orchestrates the full startup sequence:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Connecting the configured data source (PostgreSQL pool plus schema,
//!   or the sensor HTTP API)
//! - Building the health engine and running one refresh up front
//! - Spawning the refresh controller
//! - Serving the JSON surface via the `routes` gateway (EMBP pattern)
//!
//! # Environment Variables
//! See `config::load_with` for the full table. Logging is controlled by:
//! - `RUST_LOG` (optional) – full filter directive, wins when set
//! - `AXUM_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AXUM_SPAN_EVENTS` (optional) – span event mode for tracing
//! - `FORCE_COLOR` (optional) – force ANSI colours on or off
//!
//! Ctrl-C stops accepting requests and cancels the refresh controller.

use std::{env, io::IsTerminal, sync::Arc};

use anyhow::{anyhow, Context, Result};
use axum::Router;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use farmsense_health::config::{self, mask_db_url, SourceKind};
use farmsense_health::{
    routes, schema, Config, DataSource, HealthEngine, HttpSource, PgSource, RefreshController,
};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();
    let messages = cfg.load_messages()?;

    let source = connect_source(&cfg).await?;
    let engine = Arc::new(HealthEngine::new(source, cfg.engine_settings()).with_messages(messages));

    // A failed first refresh is not fatal; the controller retries on its tick.
    if let Err(err) = engine.refresh_now().await {
        tracing::warn!(error = %err, "initial refresh failed, serving an empty view");
    }

    let cancel = CancellationToken::new();
    let refresh = RefreshController::new(Arc::clone(&engine)).start(cancel.clone());

    // Build app from routes gateway (EMBP)
    let app: Router = routes::router(engine);

    tracing::info!("Listening on {}", cfg.listen_addr);
    let listener = tokio::net::TcpListener::bind(cfg.listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await?;

    refresh.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

// ---

async fn connect_source(cfg: &Config) -> Result<Arc<dyn DataSource>> {
    // ---
    match &cfg.source {
        SourceKind::Postgres { db_url, db_pool_max } => {
            let masked = mask_db_url(db_url);
            tracing::info!("Attempting to connect to database: {}", masked);

            let pool = PgPoolOptions::new()
                .max_connections(*db_pool_max)
                .connect(db_url)
                .await
                .map_err(|e| anyhow!("Failed to connect to database '{}': {}", masked, e))?;

            tracing::info!("Successfully connected to database");

            schema::create_schema(&pool).await?;
            Ok(Arc::new(PgSource::new(pool)))
        }
        SourceKind::Http { api_url, api_max_pages } => {
            let source = HttpSource::new(api_url.as_str(), *api_max_pages)
                .context("Failed to build sensor API client")?;
            tracing::info!("Using sensor API at {}", api_url);
            Ok(Arc::new(source))
        }
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    // ---
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
    cancel.cancel();
}

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `AXUM_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by `RUST_LOG`, else the `AXUM_LOG_LEVEL` env var
///
/// Called once at startup, after `.env` is loaded so its values apply.
fn init_tracing() {
    // ---
    let span_events = match env::var("AXUM_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("AXUM_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn,hyper=info,reqwest=info"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
