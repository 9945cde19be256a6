//! Aegis identity-provider server binary.

use std::time::Duration;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use aegis_api::config::ApiConfig;
use aegis_api::{AppState, Repositories};
use aegis_core::repo::RefreshTokenRepo;
use aegis_core::repo::postgres::PgRefreshTokenRepo;

/// How often expired refresh-token records are swept.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// CLI arguments. Everything else comes from the environment; see
/// `ApiConfig::from_env`.
#[derive(Parser, Debug)]
#[command(name = "aegis_server", about = "Aegis SSO identity provider")]
struct Args {
    /// Address to bind the HTTP listener.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:4000")]
    bind_addr: String,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/aegis"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,aegis_api=debug,aegis_core=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let mut config = ApiConfig::from_env();
    config.bind_addr = args.bind_addr;
    config.database_url = args.database_url;

    if config.single_key_mode() {
        warn!(
            "REFRESH_TOKEN_SECRET is unset; refresh tokens share the access secret. \
             Set a distinct secret in production."
        );
    }

    info!(
        bind_addr = %config.bind_addr,
        production = config.production_mode,
        "starting aegis_server"
    );

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database_url)
        .await?;

    info!("running database migrations");
    aegis_core::repo::postgres::run_migrations(&pool).await?;

    // Periodic sweep of expired refresh-token records.
    let cleanup_repo = PgRefreshTokenRepo::new(pool.clone());
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            ticker.tick().await;
            match cleanup_repo.delete_expired(chrono::Utc::now()).await {
                Ok(0) => {}
                Ok(deleted) => info!(deleted, "swept expired refresh tokens"),
                Err(error) => warn!(%error, "refresh-token sweep failed"),
            }
        }
    });

    let state = AppState::new(config.clone(), Repositories::postgres(pool));
    let app = aegis_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "identity provider listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
