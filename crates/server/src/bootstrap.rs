use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};
use welcomebot_bot::{ActivationError, ActivationOptions, WelcomeBot};
use welcomebot_core::config::{AppConfig, ConfigError, LoadOptions};
use welcomebot_db::{connect_with_settings, migrations, DbPool, SqliteKvStore};

use crate::command_tokens::CommandTokens;
use crate::mattermost::MattermostApi;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub kv: SqliteKvStore,
    pub bot: Arc<WelcomeBot>,
    pub command_tokens: CommandTokens,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("host client could not be built: {0}")]
    HostClient(#[source] reqwest::Error),
    #[error(transparent)]
    Activation(#[from] ActivationError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "welcomebot.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "welcomebot.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "welcomebot.bootstrap.migrations_applied", "database migrations applied");

    let kv = SqliteKvStore::new(db_pool.clone());
    let api = MattermostApi::new(&config, kv.clone()).map_err(BootstrapError::HostClient)?;
    let command_tokens = api.command_tokens();
    let bot = WelcomeBot::activate(Arc::new(api), activation_options(&config)).await?;
    if config.host.command_token.is_none() && command_tokens.is_empty() {
        warn!(
            event_name = "welcomebot.bootstrap.command_tokens_missing",
            "no slash command token is known; command requests will not be authenticated"
        );
    }

    Ok(Application { config, db_pool, kv, bot: Arc::new(bot), command_tokens })
}

pub fn activation_options(config: &AppConfig) -> ActivationOptions {
    ActivationOptions {
        plugin_id: config.host.plugin_id.clone(),
        callback_base_url: config.server.callback_base_url.clone(),
        ..ActivationOptions::default()
    }
}
