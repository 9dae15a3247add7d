// Canter - terminal client for the Pony Express chat service
//
// Architecture:
// - Session store: owns the auth token, persisted across runs
// - API gateway (reqwest): builds requests against the configured endpoint
// - Resource cache: keyed fetches with de-duplication and invalidation
// - Resource layer: chats/messages/profile accessors and the send flow
// - TUI (ratatui): subscribes to cache keys and renders the views

mod api;
mod cache;
mod cli;
mod config;
mod error;
mod logging;
mod models;
mod resources;
mod search;
mod session;
mod tui;
mod util;

use anyhow::Result;
use api::ApiClient;
use cache::ResourceCache;
use config::{Config, LogRotation};
use logging::{LogBuffer, TuiLogLayer};
use resources::ChatService;
use session::{SessionStore, TokenStorage};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Handle CLI commands first (config --show, logout, ...)
    // If a command was handled, exit early
    if cli::handle_cli() {
        return Ok(());
    }

    // Ensure config template exists (helps users discover options)
    Config::ensure_config_exists();

    let config = Config::from_env();

    // Logs go to an in-memory buffer rendered by the TUI - writing to stdout
    // would garble the alternate screen. File logging is layered on top when
    // enabled.
    //
    // Precedence: RUST_LOG env var > config file > default "info"
    let log_buffer = LogBuffer::new();
    let default_filter = format!("canter={}", config.logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    let _file_guard = init_logging(&config, filter, log_buffer.clone());

    // Restore any persisted session before the first render, so a restart
    // does not force re-login.
    let session = SessionStore::restore(TokenStorage::new(config.session_file.clone()));

    let gateway = ApiClient::new(config.api_url.clone(), session.clone())?;
    let service = ChatService::new(Arc::new(gateway), ResourceCache::new(), session);

    tracing::info!("Chat service endpoint: {}", config.api_url);

    // Run the TUI in the main task; blocks until the user quits.
    tui::run_tui(service, log_buffer, config.case_insensitive_search).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Initialize tracing with the TUI buffer layer and, when enabled, a
/// rotating JSON file layer. The returned guard must stay alive for the
/// duration of the program so file logs flush.
fn init_logging(
    config: &Config,
    filter: EnvFilter,
    log_buffer: LogBuffer,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    if !config.logging.file_enabled {
        tracing_subscriber::registry()
            .with(filter)
            .with(TuiLogLayer::new(log_buffer))
            .init();
        return None;
    }

    if let Err(e) = std::fs::create_dir_all(&config.logging.file_dir) {
        eprintln!(
            "Warning: Could not create log directory {:?}: {}",
            config.logging.file_dir, e
        );
        // Fall back to buffer-only logging
        tracing_subscriber::registry()
            .with(filter)
            .with(TuiLogLayer::new(log_buffer))
            .init();
        return None;
    }

    // Rolling file appender based on configured rotation
    let file_appender = match config.logging.file_rotation {
        LogRotation::Hourly => tracing_appender::rolling::hourly(
            &config.logging.file_dir,
            &config.logging.file_prefix,
        ),
        LogRotation::Daily => tracing_appender::rolling::daily(
            &config.logging.file_dir,
            &config.logging.file_prefix,
        ),
        LogRotation::Never => tracing_appender::rolling::never(
            &config.logging.file_dir,
            &config.logging.file_prefix,
        ),
    };

    // Non-blocking writer: writes happen in a background thread.
    // File layer uses JSON format for structured log parsing.
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(TuiLogLayer::new(log_buffer))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .init();

    Some(guard)
}
