use anyhow::{Context, Result};
use bigdecimal::BigDecimal;
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::FeeSchedule;
use crate::stripe::client::DEFAULT_API_BASE;
use crate::stripe::webhook::DEFAULT_TOLERANCE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("LOG_FORMAT must be 'text' or 'json', got '{}'", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    /// Postgres document store; the in-memory store is used when unset.
    pub database_url: Option<String>,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_api_base: String,
    pub webhook_tolerance: Duration,
    pub fees: FeeSchedule,
    /// Mail relay for customer notifications; notifications are only logged when unset.
    pub notify_url: Option<String>,
    pub log_format: LogFormat,
    pub log_request_body: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| var(key).with_context(|| format!("{} must be set", key));

        let stripe_api_base = var("STRIPE_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        url::Url::parse(&stripe_api_base).context("STRIPE_API_BASE is not a valid URL")?;

        let notify_url = var("NOTIFY_URL");
        if let Some(raw) = &notify_url {
            url::Url::parse(raw).context("NOTIFY_URL is not a valid URL")?;
        }

        let defaults = FeeSchedule::default();
        let fees = FeeSchedule {
            rate: decimal_var(var("PLATFORM_FEE_RATE"), "PLATFORM_FEE_RATE")?.unwrap_or(defaults.rate),
            fixed: decimal_var(var("PLATFORM_FEE_FIXED"), "PLATFORM_FEE_FIXED")?
                .unwrap_or(defaults.fixed),
        };

        Ok(Config {
            server_port: var("SERVER_PORT")
                .unwrap_or_else(|| "3000".to_string())
                .parse()
                .context("SERVER_PORT must be a port number")?,
            database_url: var("DATABASE_URL"),
            stripe_secret_key: required("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            stripe_api_base,
            webhook_tolerance: match var("WEBHOOK_TOLERANCE_SECS") {
                Some(raw) => Duration::from_secs(
                    raw.parse()
                        .context("WEBHOOK_TOLERANCE_SECS must be a number of seconds")?,
                ),
                None => DEFAULT_TOLERANCE,
            },
            fees,
            notify_url,
            log_format: var("LOG_FORMAT")
                .map(|raw| raw.parse::<LogFormat>())
                .transpose()?
                .unwrap_or(LogFormat::Text),
            log_request_body: var("LOG_REQUEST_BODY")
                .map(|raw| raw.parse::<bool>())
                .transpose()
                .context("LOG_REQUEST_BODY must be true or false")?
                .unwrap_or(false),
        })
    }
}

fn decimal_var(raw: Option<String>, key: &str) -> Result<Option<BigDecimal>> {
    raw.map(|value| {
        BigDecimal::from_str(value.trim()).with_context(|| format!("{} must be a decimal", key))
    })
    .transpose()
}
