//! Runtime configuration, assembled from the environment.

use anyhow::Context;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    /// Absent selects the in-memory store backend.
    pub database_url: Option<String>,
    /// Absent disables event publishing.
    pub nats_url: Option<String>,
    pub currency: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8083".to_string())
            .parse()
            .context("PORT must be a number")?;
        Ok(Self {
            port,
            database_url: std::env::var("DATABASE_URL").ok(),
            nats_url: std::env::var("NATS_URL").ok(),
            currency: std::env::var("CURRENCY").unwrap_or_else(|_| "USD".to_string()),
        })
    }
}
