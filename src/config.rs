use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Daemon configuration, resolved once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: PathBuf,
    pub completion: CompletionConfig,
}

#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = match env::var("PORT") {
            Ok(v) => v.parse().context("PORT must be a number")?,
            Err(_) => DEFAULT_PORT,
        };

        // Default database location is ~/.meridian/meridian.db
        let database_path = match env::var("DATABASE_PATH") {
            Ok(v) => PathBuf::from(v),
            Err(_) => {
                let home = env::var("HOME").unwrap_or_else(|_| ".".into());
                Path::new(&home).join(".meridian").join("meridian.db")
            }
        };

        let timeout_secs = match env::var("COMPLETION_TIMEOUT_SECS") {
            Ok(v) => v.parse().context("COMPLETION_TIMEOUT_SECS must be a number")?,
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };

        let completion = CompletionConfig {
            base_url: env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into()),
            api_key: env::var("OPENAI_API_KEY").context("OPENAI_API_KEY not set")?,
            model: env::var("CHAT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into()),
            timeout: Duration::from_secs(timeout_secs),
        };

        Ok(Self {
            port,
            database_path,
            completion,
        })
    }
}
