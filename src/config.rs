use std::net::SocketAddr;

use anyhow::Context;

const DEFAULT_DATABASE_URL: &str = "sqlite://sharebite.db?mode=rwc";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_FRONTEND_URLS: &str = "http://localhost:5173,http://localhost:5174";

/// Runtime settings, read from the environment (and `.env`, if present).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub frontend_urls: Vec<String>,
    pub session_inactivity: time::Duration,
    pub db_max_connections: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());

        let database_url = var("DATABASE_URL", DEFAULT_DATABASE_URL);

        let bind_addr = var("BIND_ADDR", DEFAULT_BIND_ADDR);
        let bind_addr = bind_addr
            .parse()
            .with_context(|| format!("BIND_ADDR {bind_addr:?} is not a socket address"))?;

        let frontend_urls = var("FRONTEND_URLS", DEFAULT_FRONTEND_URLS)
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_owned)
            .collect();

        let minutes = var("SESSION_INACTIVITY_MINUTES", "180");
        let minutes: i64 = minutes
            .parse()
            .with_context(|| format!("SESSION_INACTIVITY_MINUTES {minutes:?} is not a number"))?;
        anyhow::ensure!(minutes > 0, "SESSION_INACTIVITY_MINUTES must be positive");

        let max = var("DB_MAX_CONNECTIONS", "16");
        let db_max_connections: u32 = max
            .parse()
            .with_context(|| format!("DB_MAX_CONNECTIONS {max:?} is not a number"))?;
        anyhow::ensure!(db_max_connections > 0, "DB_MAX_CONNECTIONS must be positive");

        Ok(Config {
            database_url,
            bind_addr,
            frontend_urls,
            session_inactivity: time::Duration::minutes(minutes),
            db_max_connections,
        })
    }
}
