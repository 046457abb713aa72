mod bootstrap;
mod command_tokens;
mod health;
mod logging;
mod mattermost;
mod routes;

use std::time::Duration;

use anyhow::{Context, Result};
use welcomebot_core::config::{AppConfig, LoadOptions};

use crate::routes::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging has to be up before bootstrap so activation failures are visible.
    let config = AppConfig::load(LoadOptions::default())?;
    logging::init(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let state = AppState::new(
        app.bot.clone(),
        app.config.host.command_token.clone(),
        app.command_tokens.clone(),
        app.config.server.hook_secret.clone(),
    );
    let router = routes::router(state).merge(health::router(app.kv.clone()));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    tracing::info!(
        event_name = "welcomebot.server.started",
        bind_address = %address,
        plugin_id = %app.bot.plugin_id(),
        "welcomebot-server started"
    );
    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(event_name = "welcomebot.server.stopping", "welcomebot-server stopping");
    let drain = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(drain, app.db_pool.close()).await.is_err() {
        tracing::warn!(
            event_name = "welcomebot.server.pool_close_timeout",
            "database pool did not close before the shutdown deadline"
        );
    }

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "welcomebot.server.signal_error",
            error = %error,
            "failed to listen for the shutdown signal"
        );
    }
}
