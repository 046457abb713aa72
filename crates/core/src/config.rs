use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub host: HostConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct HostConfig {
    pub url: String,
    pub bot_token: SecretString,
    pub plugin_id: String,
    pub command_token: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub callback_base_url: Option<String>,
    pub hook_secret: Option<SecretString>,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub host_url: Option<String>,
    pub bot_token: Option<String>,
    pub plugin_id: Option<String>,
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub port: Option<u16>,
    pub callback_base_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_PLUGIN_ID: &str = "com.mattermost.welcomebot";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: HostConfig {
                url: "http://localhost:8065".to_string(),
                bot_token: String::new().into(),
                plugin_id: DEFAULT_PLUGIN_ID.to_string(),
                command_token: None,
                timeout_secs: 10,
            },
            database: DatabaseConfig {
                url: "sqlite://welcomebot.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8086,
                callback_base_url: None,
                hook_secret: None,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("welcomebot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Base URL the host uses to reach this process. Falls back to the host
    /// site URL when no dedicated callback address is configured.
    pub fn callback_base_url(&self) -> &str {
        self.server.callback_base_url.as_deref().unwrap_or(&self.host.url)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(host) = patch.host {
            if let Some(url) = host.url {
                self.host.url = url;
            }
            if let Some(bot_token_value) = host.bot_token {
                self.host.bot_token = secret_value(bot_token_value);
            }
            if let Some(plugin_id) = host.plugin_id {
                self.host.plugin_id = plugin_id;
            }
            if let Some(command_token_value) = host.command_token {
                self.host.command_token = Some(secret_value(command_token_value));
            }
            if let Some(timeout_secs) = host.timeout_secs {
                self.host.timeout_secs = timeout_secs;
            }
        }

        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(callback_base_url) = server.callback_base_url {
                self.server.callback_base_url = Some(callback_base_url);
            }
            if let Some(hook_secret_value) = server.hook_secret {
                self.server.hook_secret = Some(secret_value(hook_secret_value));
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("WELCOMEBOT_HOST_URL") {
            self.host.url = value;
        }
        if let Some(value) = read_env("WELCOMEBOT_HOST_BOT_TOKEN") {
            self.host.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("WELCOMEBOT_HOST_PLUGIN_ID") {
            self.host.plugin_id = value;
        }
        if let Some(value) = read_env("WELCOMEBOT_HOST_COMMAND_TOKEN") {
            self.host.command_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("WELCOMEBOT_HOST_TIMEOUT_SECS") {
            self.host.timeout_secs = parse_u64("WELCOMEBOT_HOST_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("WELCOMEBOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("WELCOMEBOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("WELCOMEBOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("WELCOMEBOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("WELCOMEBOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("WELCOMEBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("WELCOMEBOT_SERVER_PORT") {
            self.server.port = parse_u16("WELCOMEBOT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("WELCOMEBOT_SERVER_CALLBACK_BASE_URL") {
            self.server.callback_base_url = Some(value);
        }
        if let Some(value) = read_env("WELCOMEBOT_SERVER_HOOK_SECRET") {
            self.server.hook_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("WELCOMEBOT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("WELCOMEBOT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("WELCOMEBOT_LOGGING_LEVEL").or_else(|| read_env("WELCOMEBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("WELCOMEBOT_LOGGING_FORMAT").or_else(|| read_env("WELCOMEBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(host_url) = overrides.host_url {
            self.host.url = host_url;
        }
        if let Some(bot_token) = overrides.bot_token {
            self.host.bot_token = secret_value(bot_token);
        }
        if let Some(plugin_id) = overrides.plugin_id {
            self.host.plugin_id = plugin_id;
        }
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(callback_base_url) = overrides.callback_base_url {
            self.server.callback_base_url = Some(callback_base_url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_host(&self.host)?;
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("welcomebot.toml"), PathBuf::from("config/welcomebot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_host(host: &HostConfig) -> Result<(), ConfigError> {
    if !is_http_url(&host.url) {
        return Err(ConfigError::Validation(
            "host.url must start with http:// or https://".to_string(),
        ));
    }

    if host.bot_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "host.bot_token is required. Create a bot account under System Console > Integrations > Bot Accounts and copy its access token".to_string(),
        ));
    }

    let plugin_id = host.plugin_id.trim();
    let url_safe = plugin_id
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_'));
    if plugin_id.is_empty() || !url_safe {
        return Err(ConfigError::Validation(
            "host.plugin_id must be non-empty and contain only [A-Za-z0-9._-]".to_string(),
        ));
    }

    if host.timeout_secs == 0 || host.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "host.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    Ok(())
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    if let Some(base_url) = &server.callback_base_url {
        if !is_http_url(base_url) {
            return Err(ConfigError::Validation(
                "server.callback_base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    host: Option<HostPatch>,
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct HostPatch {
    url: Option<String>,
    bot_token: Option<String>,
    plugin_id: Option<String>,
    command_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    callback_base_url: Option<String>,
    hook_secret: Option<String>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
