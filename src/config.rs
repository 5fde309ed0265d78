use std::{env, fmt::Display, str::FromStr, time::Duration};

use anyhow::{anyhow, Context, Result};
use tracing::info;

use crate::cart::MergePolicy;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub nats_url: Option<String>,
    pub jwt_secret: String,
    pub messaging_api_url: String,
    pub messaging_api_token: String,
    pub messaging_timeout: Duration,
    pub webhook_secret: Option<String>,
    pub cart_merge_policy: MergePolicy,
}

impl Config {
    /// Reads `.env` if present, then the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Ok(Self {
            port: try_load("PORT", "8083")?,
            database_url: required("DATABASE_URL")?,
            database_max_connections: try_load("DATABASE_MAX_CONNECTIONS", "10")?,
            nats_url: optional("NATS_URL"),
            jwt_secret: required("AUTH_JWT_SECRET")?,
            messaging_api_url: required("MESSAGING_API_URL")?,
            messaging_api_token: required("MESSAGING_API_TOKEN")?,
            messaging_timeout: Duration::from_secs(try_load("MESSAGING_TIMEOUT_SECS", "10")?),
            webhook_secret: optional("WEBHOOK_SECRET"),
            cart_merge_policy: try_load("CART_MERGE_POLICY", "local-wins")?,
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn required(key: &str) -> Result<String> {
    optional(key).ok_or_else(|| anyhow!("{key} must be set"))
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = optional(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse().map_err(|e| anyhow!("{e}")).with_context(|| format!("Invalid {key} value: {raw}"))
}
