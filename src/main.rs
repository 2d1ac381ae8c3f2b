mod config;
mod dispatcher;
mod error;
mod fetcher;
mod handlers;
mod operator;
mod pinterest;
mod platform;
mod process;
mod spotify;
mod tasks;
#[cfg(test)]
mod test_support;
mod yt_dlp;

use crate::{config::Settings, error::AppError, operator::Operator};
use handlers::{build_handler, AppServices};
use std::{env, sync::Arc, time::Duration};
use teloxide::{net::default_reqwest_settings, prelude::*};
use tracing::{error, info, instrument, warn, Instrument};
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    if let Err(err) = run().await {
        eprintln!("fatal error: {err}");
        error!(error = %err, "Application terminated with fatal error");
        return Err(err);
    }
    info!("Application shutdown complete");
    Ok(())
}

#[instrument]
async fn run() -> Result<(), AppError> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Initializing linkgrab bot");
    let settings = Arc::new(Settings::from_env()?);
    info!(
        download_dir = %settings.download_dir.display(),
        admin_configured = settings.admin_id.is_some(),
        "Settings loaded"
    );
    let token = env::var("TELOXIDE_TOKEN")
        .map_err(|_| AppError::Config("TELOXIDE_TOKEN is not set".to_string()))?;

    // Uploads of large videos need far more than the default request timeout.
    let client = default_reqwest_settings()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(300))
        .build()
        .map_err(|e| {
            error!(error = %e, "Failed to build HTTP client");
            e
        })?;
    info!("HTTP client configured successfully");

    let bot = Bot::with_client(token, client);
    info!("Telegram bot initialized");

    let operator = Operator::new(bot.clone(), settings.admin_id);
    let services = AppServices::new(settings, operator.clone())?;
    info!("Application services initialized");
    operator.announce_startup().await;

    let handler = build_handler();
    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![services])
        .build();
    info!("Dispatcher built successfully");

    let shutdown_token = dispatcher.shutdown_token();
    tokio::spawn(
        async move {
            info!("Shutdown signal handler spawned");
            shutdown_signal().await;
            info!("Shutdown signal received, initiating graceful shutdown");
            if let Ok(wait) = shutdown_token.shutdown() {
                wait.await;
                info!("Graceful shutdown completed");
            } else {
                warn!("Failed to initiate graceful shutdown");
            }
        }
        .in_current_span(),
    );

    info!("Starting dispatcher event loop");
    dispatcher.dispatch().await;
    info!("Dispatcher stopped");
    Ok(())
}

/// Resolves on SIGTERM or Ctrl+C.
#[cfg(unix)]
async fn shutdown_signal() {
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(err) => {
            warn!(error = %err, "SIGTERM handler unavailable, waiting for Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = term.recv() => info!("Received SIGTERM"),
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received Ctrl+C");
}
