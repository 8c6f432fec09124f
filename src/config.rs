use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};

const DEFAULT_DATABASE_URL: &str = "sqlite://./corona_data/corona.db?mode=rwc";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:7200";
const DEFAULT_SCHEDULE_PATH: &str = "./schedule.json";
const DEFAULT_SOURCE_URL: &str = "http://127.0.0.1:7300/statistics";
const DEFAULT_LOG_DIR: &str = "./logs";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub schedule_path: PathBuf,
    pub source_url: String,
    pub log_dir: PathBuf,
}

fn var(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Process environment first, then `.env`, then the defaults.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let bind_addr = var("CORONA_BIND_ADDR", DEFAULT_BIND_ADDR);
        Ok(Self {
            database_url: var("CORONA_DATABASE_URL", DEFAULT_DATABASE_URL),
            bind_addr: bind_addr
                .parse()
                .with_context(|| format!("invalid CORONA_BIND_ADDR `{}`", bind_addr))?,
            schedule_path: var("CORONA_SCHEDULE_PATH", DEFAULT_SCHEDULE_PATH).into(),
            source_url: var("CORONA_SOURCE_URL", DEFAULT_SOURCE_URL),
            log_dir: var("CORONA_LOG_DIR", DEFAULT_LOG_DIR).into(),
        })
    }

    /// Creates the directory holding a file-backed SQLite database.
    pub fn ensure_data_dir(&self) -> Result<()> {
        let Some(path) = self.database_url.strip_prefix("sqlite://") else {
            return Ok(());
        };
        let path = path.split('?').next().unwrap_or(path);
        if let Some(dir) = std::path::Path::new(path).parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create database directory {:?}", dir))?;
            }
        }
        Ok(())
    }
}
