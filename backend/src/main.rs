//! Lot Ledger - server bootstrap
//!
//! Loads configuration, connects to PostgreSQL, runs migrations and serves the
//! health probes.

use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use lotledger::{config::LogFormat, create_app, AppState, Config};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "lotledger=debug,lotledger_server=debug,tower_http=debug,sqlx=warn";

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load().context("loading configuration")?;

    init_tracing(config.log.format);

    tracing::info!("Starting Lot Ledger server");
    tracing::info!(
        environment = %config.environment,
        near_expiry_days = config.ledger.near_expiry_days,
        roles = config.access.role_names().count(),
        "configuration loaded"
    );

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_secs))
        .connect(&config.database.url)
        .await
        .context("connecting to database")?;

    tracing::info!("Database connection established");

    if config.should_run_migrations() {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Migrations completed");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("parsing server address")?;

    let app = create_app(AppState::new(db_pool, config));

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
