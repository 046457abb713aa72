use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use toml::Value;
use welcomebot_core::config::{AppConfig, LoadOptions};

use crate::commands::{CommandResult, ErrorClass};

struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                ErrorClass::ConfigValidation,
                format!("config validation failed: {error}"),
            );
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let fields = effective_fields(&config);
    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    let mut details = serde_json::Map::new();
    for field in &fields {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, &source));
        details.insert(field.key.to_string(), json!({ "value": field.value, "source": source }));
    }

    CommandResult::success_with_details(
        "config",
        lines.join("\n"),
        Some(serde_json::Value::Object(details)),
    )
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    vec![
        Field { key: "host.url", env_keys: &["WELCOMEBOT_HOST_URL"], value: config.host.url.clone() },
        Field {
            key: "host.bot_token",
            env_keys: &["WELCOMEBOT_HOST_BOT_TOKEN"],
            value: redact_token(config.host.bot_token.expose_secret()),
        },
        Field {
            key: "host.plugin_id",
            env_keys: &["WELCOMEBOT_HOST_PLUGIN_ID"],
            value: config.host.plugin_id.clone(),
        },
        Field {
            key: "host.command_token",
            env_keys: &["WELCOMEBOT_HOST_COMMAND_TOKEN"],
            value: redact_optional(config.host.command_token.as_ref()),
        },
        Field {
            key: "host.timeout_secs",
            env_keys: &["WELCOMEBOT_HOST_TIMEOUT_SECS"],
            value: config.host.timeout_secs.to_string(),
        },
        Field {
            key: "database.url",
            env_keys: &["WELCOMEBOT_DATABASE_URL"],
            value: config.database.url.clone(),
        },
        Field {
            key: "database.max_connections",
            env_keys: &["WELCOMEBOT_DATABASE_MAX_CONNECTIONS"],
            value: config.database.max_connections.to_string(),
        },
        Field {
            key: "database.timeout_secs",
            env_keys: &["WELCOMEBOT_DATABASE_TIMEOUT_SECS"],
            value: config.database.timeout_secs.to_string(),
        },
        Field {
            key: "server.bind_address",
            env_keys: &["WELCOMEBOT_SERVER_BIND_ADDRESS"],
            value: config.server.bind_address.clone(),
        },
        Field {
            key: "server.port",
            env_keys: &["WELCOMEBOT_SERVER_PORT"],
            value: config.server.port.to_string(),
        },
        Field {
            key: "server.callback_base_url",
            env_keys: &["WELCOMEBOT_SERVER_CALLBACK_BASE_URL"],
            value: config.server.callback_base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        },
        Field {
            key: "server.hook_secret",
            env_keys: &["WELCOMEBOT_SERVER_HOOK_SECRET"],
            value: redact_optional(config.server.hook_secret.as_ref()),
        },
        Field {
            key: "server.graceful_shutdown_secs",
            env_keys: &["WELCOMEBOT_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            value: config.server.graceful_shutdown_secs.to_string(),
        },
        Field {
            key: "logging.level",
            env_keys: &["WELCOMEBOT_LOGGING_LEVEL", "WELCOMEBOT_LOG_LEVEL"],
            value: config.logging.level.clone(),
        },
        Field {
            key: "logging.format",
            env_keys: &["WELCOMEBOT_LOGGING_FORMAT", "WELCOMEBOT_LOG_FORMAT"],
            value: format!("{:?}", config.logging.format).to_ascii_lowercase(),
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("welcomebot.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/welcomebot.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    for env_key in env_keys {
        let set = env::var(env_key).map(|value| !value.trim().is_empty()).unwrap_or(false);
        if set {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: &str) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    // Keep a short prefix so operators can tell tokens apart.
    if trimmed.len() > 8 {
        if let Some(prefix) = trimmed.get(..4) {
            return format!("{prefix}***");
        }
    }

    "<redacted>".to_string()
}

fn redact_optional(secret: Option<&SecretString>) -> String {
    match secret {
        Some(secret) => redact_token(secret.expose_secret()),
        None => "<unset>".to_string(),
    }
}
