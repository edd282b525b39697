use anyhow::Context;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use foodgram::{config::Config, db, routes, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = Config::load()?;

    info!("Connecting to {}", config.database_url);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("failed to open database")?;

    db::prepare_db(&pool).await.context("failed to prepare schema")?;

    if let Some(path) = &config.ingredients_file {
        db::import_ingredients(&pool, path)
            .await
            .with_context(|| format!("failed to import {}", path.display()))?;
    }

    let address = format!("0.0.0.0:{}", config.port);
    let app = routes::generate_routes(AppState::new(pool, config));

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {err}");
        return;
    }
    info!("Shutting down");
}
