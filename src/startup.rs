use crate::config::Config;
use crate::db::schema;
use anyhow::{Context, Result};
use sqlx::PgPool;

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub card_reservations: bool,
    pub gateway_configured: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// Reservations and the gateway are optional; they are reported, not required.
    pub fn is_valid(&self) -> bool {
        self.environment && self.database
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));
        println!("Card Reservations:     {}", enabled(self.card_reservations));
        println!("Refund Gateway:        {}", enabled(self.gateway_configured));

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

fn enabled(on: bool) -> &'static str {
    if on { "enabled" } else { "disabled" }
}

pub async fn validate_environment(config: &Config, pool: &PgPool) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        card_reservations: false,
        gateway_configured: config.gateway.is_some(),
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    match validate_database(pool).await {
        Ok(reservations) => report.card_reservations = reservations,
        Err(e) => {
            report.database = false;
            report.errors.push(format!("Database: {}", e));
        }
    }

    Ok(report)
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.admin_api_key.is_empty() {
        anyhow::bail!("ADMIN_API_KEY is empty");
    }
    if config.notify_secret.is_empty() {
        anyhow::bail!("PAYMENT_NOTIFY_SECRET is empty");
    }
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }

    config.fulfillment_policy()?;

    if let Some(gateway) = &config.gateway {
        url::Url::parse(&gateway.url).context("GATEWAY_URL is not a valid URL")?;
    }
    if let Some(redis_url) = &config.redis_url {
        url::Url::parse(redis_url).context("REDIS_URL is not a valid URL")?;
    }

    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<bool> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .context("Failed to connect to database")?;

    let caps = schema::probe_capabilities(pool)
        .await
        .context("Failed to inspect card schema")?;

    Ok(caps.supports_reservations())
}
