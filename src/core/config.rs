use anyhow::{anyhow, Context, Result};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::edgar::client::EdgarConfig;

#[derive(Clone, Debug)]
pub struct TrackerConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub edgar: EdgarConfig,
    /// Minimum gap between successive upstream calls.
    pub sec_sleep: Duration,
    pub poll_interval: Duration,
    pub enrich_batch: usize,
    pub backfill_days: u32,
}

fn var_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{} has invalid value '{}': {}", name, raw, e)),
        _ => Ok(default),
    }
}

fn url_var(name: &str, default: &str) -> Result<Url> {
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    Url::parse(&raw).with_context(|| format!("{} is not a valid URL", name))
}

impl TrackerConfig {
    /// The EDGAR part alone, for commands that never touch the database.
    pub fn edgar_from_env() -> Result<EdgarConfig> {
        let defaults = EdgarConfig::default();
        Ok(EdgarConfig {
            www_url: url_var("EDGAR_WWW_URL", defaults.www_url.as_str())?,
            data_url: url_var("EDGAR_DATA_URL", defaults.data_url.as_str())?,
            user_agent: std::env::var("SEC_USER_AGENT").unwrap_or(defaults.user_agent),
            feed_timeout: Duration::from_secs(var_or("SEC_FEED_TIMEOUT_SECS", 30)?),
            facts_timeout: Duration::from_secs(var_or("SEC_FACTS_TIMEOUT_SECS", 10)?),
        })
    }

    /// Reads the process environment. Callers load `.env` first.
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow!("DATABASE_URL environment variable not set"))?;

        Ok(Self {
            database_url,
            db_max_connections: var_or("DB_MAX_CONNECTIONS", 16)?,
            edgar: Self::edgar_from_env()?,
            sec_sleep: Duration::from_millis(var_or("SEC_SLEEP_MS", 500)?),
            poll_interval: Duration::from_secs(var_or("POLL_INTERVAL_SECS", 3600)?),
            enrich_batch: var_or("ENRICH_BATCH", 25)?,
            backfill_days: var_or("BACKFILL_DAYS", 90)?,
        })
    }
}
