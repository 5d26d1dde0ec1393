use std::sync::Arc;

mod app;
mod auth;
mod config;
mod db;
mod email;
mod error;
mod free_shelf;
mod images;
mod listings;
mod orders;
mod state;
mod storage;
#[cfg(test)]
mod testing;

use crate::{config::AppConfig, db::Database, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "campusshelf=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!(environment = ?config.environment, "starting campusshelf");

    let db = Arc::new(Database::new(&config.database));
    db::run_migrations(&db).await;

    let state = AppState::init(config.clone(), db).await?;
    let app = app::build_app(state);

    let host = std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port = std::env::var("APP_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8080);
    app::serve(app, &host, port).await
}
