use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::tailoring::applicator::AppendPolicy;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    /// Exported artifacts are written here.
    pub work_dir: PathBuf,
    pub session_ttl_minutes: i64,
    pub append_policy: AppendPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: optional_env("PORT", "8080")
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: optional_env("RUST_LOG", "info"),
            work_dir: std::env::var("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir().join("tailor")),
            session_ttl_minutes: optional_env("SESSION_TTL_MINUTES", "60")
                .parse::<i64>()
                .ok()
                .filter(|minutes| *minutes > 0)
                .context("SESSION_TTL_MINUTES must be a positive number of minutes")?,
            append_policy: optional_env("APPEND_POLICY", "same_paragraph")
                .parse::<AppendPolicy>()
                .map_err(anyhow::Error::msg)
                .context("APPEND_POLICY must be same_paragraph or new_paragraph")?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
