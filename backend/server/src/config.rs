use std::{env, fmt::Display, str::FromStr, time::Duration};

use anyhow::{Error, anyhow};
use tracing::{info, warn};

pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub database_url: Option<String>,
    pub proposals_db_path: String,
    pub verification_ttl_hours: i64,
    pub public_url: String,
    pub catalog_url: Option<String>,
    pub catalog_timeout: Duration,
    pub similarity_max_distance: f64,
    pub allowed_origin: String,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        let port = try_load("RUST_PORT", "1111")?;

        Ok(Self {
            port,
            database_path: try_load("DNA_DATABASE_PATH", bank::BANK_PATH)?,
            database_url: optional("DNA_DATABASE_URL"),
            proposals_db_path: try_load("PROPOSALS_DB_PATH", "proposals.db")?,
            verification_ttl_hours: try_load("VERIFICATION_TTL_HOURS", "24")?,
            public_url: try_load("PUBLIC_URL", &format!("http://localhost:{port}"))?,
            catalog_url: optional("MODEL_CATALOG_URL"),
            catalog_timeout: Duration::from_secs(try_load("CATALOG_TIMEOUT_SECS", "5")?),
            similarity_max_distance: try_load("SIMILARITY_MAX_DISTANCE", "20")?,
            allowed_origin: try_load("ALLOWED_ORIGIN", "*")?,
        })
    }

    pub fn verification_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.verification_ttl_hours)
    }

    pub fn verification_link(&self, token: &str) -> String {
        format!("{}/verify?token={token}", self.public_url.trim_end_matches('/'))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 1111,
            database_path: bank::BANK_PATH.to_string(),
            database_url: None,
            proposals_db_path: "proposals.db".to_string(),
            verification_ttl_hours: 24,
            public_url: "http://localhost:1111".to_string(),
            catalog_url: None,
            catalog_timeout: Duration::from_secs(5),
            similarity_max_distance: 20.0,
            allowed_origin: "*".to_string(),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T, Error>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| anyhow!("Invalid {key} value: {e}"))
}
