use cardvault_core::cache::{InvalidationSink, LogInvalidationSink, RedisInvalidationSink};
use cardvault_core::cli::{self, Cli, Commands, DbCommands};
use cardvault_core::config::Config;
use cardvault_core::gateway::{HttpGateway, PaymentGateway};
use cardvault_core::{create_app, db, AppState};
use clap::Parser;
use sqlx::migrate::Migrator;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let config = Config::from_env()?;

    init_tracing();

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Db(DbCommands::Capabilities) => cli::handle_db_capabilities(&config).await,
        Commands::Config => cli::handle_config_validate(&config).await,
    }
}

fn init_tracing() {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let policy = config.fulfillment_policy()?;

    // Database pool
    let pool = db::create_pool(&config).await?;

    // Run migrations
    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("Database migrations completed");

    let capabilities = db::schema::probe_capabilities(&pool).await?;

    let gateway: Option<Arc<dyn PaymentGateway>> = match config.gateway.clone() {
        Some(gateway_config) => {
            tracing::info!("Refund gateway configured at {}", gateway_config.url);
            Some(Arc::new(HttpGateway::new(gateway_config)))
        }
        None => {
            tracing::warn!("Refund gateway not configured, refund initiation disabled");
            None
        }
    };

    let invalidation: Arc<dyn InvalidationSink> = match &config.redis_url {
        Some(redis_url) => Arc::new(RedisInvalidationSink::new(redis_url)?),
        None => Arc::new(LogInvalidationSink),
    };

    let app_state = AppState::new(
        pool,
        capabilities,
        policy,
        gateway,
        invalidation,
        config.admin_api_key.clone(),
        config.notify_secret.clone(),
    );
    let app = create_app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
