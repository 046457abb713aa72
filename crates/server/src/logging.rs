use tracing::Level;
use tracing_subscriber::EnvFilter;
use welcomebot_core::config::{AppConfig, LogFormat};

const WELCOMEBOT_TARGETS: &[&str] = &["welcomebot_server", "welcomebot_bot", "welcomebot_core", "welcomebot_db"];

/// Installs the global subscriber. `RUST_LOG` replaces the configured
/// directives when set.
pub fn init(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives(&config.logging.level)));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// The configured level applies to the welcomebot crates only. Everything
/// else, sqlx statement logs and the HTTP stack included, stays at `warn`.
pub fn directives(level: &str) -> String {
    let level = level.trim().parse::<Level>().unwrap_or(Level::INFO).to_string().to_ascii_lowercase();
    let mut directives = vec!["warn".to_owned()];
    directives.extend(WELCOMEBOT_TARGETS.iter().map(|target| format!("{target}={level}")));
    directives.join(",")
}
