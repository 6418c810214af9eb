use clap::{Parser, Subcommand};
use crate::config::Config;

#[derive(Parser)]
#[command(name = "cardvault-core")]
#[command(about = "Cardvault Core - Card Inventory Fulfillment and Refunds", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,

    /// Report which optional schema features are deployed
    Capabilities,
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    use sqlx::migrate::Migrator;
    use std::path::Path;

    let pool = crate::db::create_pool(config).await?;
    let migrator = Migrator::new(Path::new("./migrations")).await?;

    tracing::info!("Running database migrations...");
    migrator.run(&pool).await?;

    tracing::info!("Database migrations completed");
    println!("✓ Database migrations completed");

    Ok(())
}

pub async fn handle_db_capabilities(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;
    let caps = crate::db::schema::probe_capabilities(&pool).await?;

    let reservations = if caps.supports_reservations() {
        "supported"
    } else {
        "not supported (legacy claims)"
    };
    println!("Card reservations: {}", reservations);

    Ok(())
}

pub async fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Reservation Freshness: {}s", config.reservation_freshness_secs);
    println!("  Amount Epsilon: {}", config.amount_epsilon);
    match &config.gateway {
        Some(gateway) => println!("  Gateway URL: {}", gateway.url),
        None => println!("  Gateway URL: (not configured)"),
    }

    let pool = crate::db::create_pool(config).await?;
    let report = crate::startup::validate_environment(config, &pool).await?;
    report.print();

    if !report.is_valid() {
        anyhow::bail!("Configuration is invalid");
    }

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user_start = slash_pos + 2;
                let user = &url[user_start..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
