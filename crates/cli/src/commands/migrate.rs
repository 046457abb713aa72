use serde_json::json;
use welcomebot_core::config::{AppConfig, LoadOptions};
use welcomebot_core::kv::{CHANNEL_WELCOME_PREFIX, TEAM_WELCOME_PREFIX};
use welcomebot_db::{connect_with_settings, is_in_memory, migrations, DbPool, SqliteKvStore};

use crate::commands::{CommandResult, ErrorClass};

struct KvReport {
    applied: i64,
    team_overrides: i64,
    channel_overrides: i64,
}

type Failure = (ErrorClass, String);

/// Applies pending migrations, then checks that the KV table the bot reads
/// welcome overrides from is usable and reports what it holds.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                ErrorClass::ConfigValidation,
                format!("configuration issue: {error}"),
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                ErrorClass::RuntimeInit,
                format!("failed to initialize async runtime: {error}"),
            );
        }
    };

    let in_memory = is_in_memory(&config.database.url);
    match runtime.block_on(migrate(&config)) {
        Ok(report) => {
            let mut message = format!(
                "applied pending migrations ({} recorded); kv store holds {} team and {} channel overrides",
                report.applied, report.team_overrides, report.channel_overrides
            );
            if in_memory {
                message.push_str("; in-memory database, nothing is persisted");
            }
            CommandResult::success_with_details(
                "migrate",
                message,
                Some(json!({
                    "applied": report.applied,
                    "kv_table": "plugin_kv",
                    "team_overrides": report.team_overrides,
                    "channel_overrides": report.channel_overrides,
                    "in_memory": in_memory,
                })),
            )
        }
        Err((error_class, message)) => CommandResult::failure("migrate", error_class, message),
    }
}

async fn migrate(config: &AppConfig) -> Result<KvReport, Failure> {
    let pool =
        connect_with_settings(&config.database.url, config.database.max_connections, config.database.timeout_secs)
            .await
            .map_err(|error| (ErrorClass::DbConnectivity, error.to_string()))?;
    let report = inspect(&pool).await;
    pool.close().await;
    report
}

async fn inspect(pool: &DbPool) -> Result<KvReport, Failure> {
    migrations::run_pending(pool).await.map_err(|error| (ErrorClass::Migration, error.to_string()))?;
    let applied =
        migrations::applied_count(pool).await.map_err(|error| (ErrorClass::Migration, error.to_string()))?;

    let ready = migrations::kv_table_ready(pool).await.map_err(|error| (ErrorClass::KvSchema, error.to_string()))?;
    if !ready {
        return Err((ErrorClass::KvSchema, "migrations finished but the plugin_kv table is missing".to_string()));
    }

    let store = SqliteKvStore::new(pool.clone());
    let team_overrides = store
        .count_with_prefix(TEAM_WELCOME_PREFIX)
        .await
        .map_err(|error| (ErrorClass::KvSchema, error.to_string()))?;
    let channel_overrides = store
        .count_with_prefix(CHANNEL_WELCOME_PREFIX)
        .await
        .map_err(|error| (ErrorClass::KvSchema, error.to_string()))?;

    Ok(KvReport { applied, team_overrides, channel_overrides })
}
