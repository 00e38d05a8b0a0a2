//! Configuration module

use std::env;
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the classifier, encoders and feature list
    pub model_dir: PathBuf,

    /// SQLite connection URL
    pub database_url: String,

    /// Server port
    pub port: u16,

    /// Verbose logging
    pub debug: bool,

    /// Abort startup when the model artifacts cannot be loaded
    pub require_model: bool,

    /// Log output format ("pretty" or "json")
    pub log_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("model"),
            database_url: "sqlite://database.db".to_string(),
            port: 5000,
            debug: true,
            require_model: false,
            log_format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            model_dir: env::var("MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_dir),

            database_url: env::var("DATABASE_URL")
                .unwrap_or(defaults.database_url),

            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),

            debug: env::var("DEBUG")
                .ok()
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.debug),

            require_model: env::var("REQUIRE_MODEL")
                .ok()
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.require_model),

            log_format: env::var("LOG_FORMAT")
                .unwrap_or(defaults.log_format),
        }
    }

    /// Default tracing filter when RUST_LOG is not set
    pub fn default_log_filter(&self) -> &'static str {
        if self.debug {
            "sentinel_ids=debug,tower_http=debug"
        } else {
            "sentinel_ids=info,tower_http=info"
        }
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
