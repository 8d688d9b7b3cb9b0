use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::{InMemoryDocumentStore, PostgresDocumentStore};
use crate::config::Config;
use crate::ports::DocumentStore;

pub struct ValidationReport {
    pub environment: bool,
    pub store: bool,
    pub gateway: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.store && self.gateway
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Document Store:        {}", status(self.store));
        println!("Payment Gateway:       {}", status(self.gateway));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

/// Connects the configured document store, running migrations for Postgres.
pub async fn connect_store(config: &Config) -> Result<Arc<dyn DocumentStore>> {
    match &config.database_url {
        Some(url) => {
            let pool = crate::db::create_pool(url)
                .await
                .context("Failed to connect to database")?;
            crate::db::run_migrations(&pool).await?;
            Ok(Arc::new(PostgresDocumentStore::new(pool)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory document store");
            Ok(Arc::new(InMemoryDocumentStore::new()))
        }
    }
}

pub async fn validate_environment(config: &Config, store: &dyn DocumentStore) -> ValidationReport {
    let mut report = ValidationReport {
        environment: true,
        store: true,
        gateway: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Err(e) = store.get("_health", "probe").await {
        report.store = false;
        report.errors.push(format!("Store: {}", e));
    }

    if let Err(e) = validate_gateway(&config.stripe_api_base).await {
        report.gateway = false;
        report.errors.push(format!("Gateway: {}", e));
    }

    report
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if !config.stripe_secret_key.starts_with("sk_") && !config.stripe_secret_key.starts_with("rk_") {
        anyhow::bail!("STRIPE_SECRET_KEY does not look like a secret or restricted key");
    }
    if !config.stripe_webhook_secret.starts_with("whsec_") {
        anyhow::bail!("STRIPE_WEBHOOK_SECRET does not look like a webhook signing secret");
    }

    url::Url::parse(&config.stripe_api_base).context("STRIPE_API_BASE is not a valid URL")?;

    Ok(())
}

/// Any HTTP answer counts; the root path is not an API route.
async fn validate_gateway(api_base: &str) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let response = client
        .get(api_base)
        .send()
        .await
        .context("Failed to reach the payment gateway")?;

    if response.status().is_server_error() {
        anyhow::bail!("Gateway returned status: {}", response.status());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;
    use crate::domain::FeeSchedule;

    fn config() -> Config {
        Config {
            server_port: 3000,
            database_url: None,
            stripe_secret_key: "sk_test_123".to_string(),
            stripe_webhook_secret: "whsec_123".to_string(),
            stripe_api_base: "https://api.stripe.com".to_string(),
            webhook_tolerance: Duration::from_secs(300),
            fees: FeeSchedule::default(),
            notify_url: None,
            log_format: LogFormat::Text,
            log_request_body: false,
        }
    }

    #[test]
    fn test_validate_env_vars_ok() {
        assert!(validate_env_vars(&config()).is_ok());
    }

    #[test]
    fn test_validate_env_vars_publishable_key() {
        let mut config = config();
        config.stripe_secret_key = "pk_test_123".to_string();

        assert!(validate_env_vars(&config).is_err());
    }

    #[test]
    fn test_validate_env_vars_invalid_url() {
        let mut config = config();
        config.stripe_api_base = "not-a-url".to_string();

        assert!(validate_env_vars(&config).is_err());
    }

    #[tokio::test]
    async fn test_connect_store_without_database_url() {
        let store = connect_store(&config()).await.unwrap();
        assert!(store.get("transactions", "missing").await.unwrap().is_none());
    }
}
