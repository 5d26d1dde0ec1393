use std::time::Duration;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::DatabaseConfig;

/// Process-wide handle to the backing store.
///
/// The pool is opened on first use. Callers that arrive while the first connect
/// is still in flight wait on that same attempt; a failed attempt leaves the
/// handle empty so the next caller tries again.
pub struct Database {
    config: DatabaseConfig,
    pool: OnceCell<PgPool>,
}

impl Database {
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            config: config.clone(),
            pool: OnceCell::new(),
        }
    }

    pub async fn pool(&self) -> anyhow::Result<&PgPool> {
        self.pool
            .get_or_try_init(|| async {
                let pool = PgPoolOptions::new()
                    .max_connections(self.config.max_connections)
                    .acquire_timeout(Duration::from_secs(30))
                    .connect(&self.config.url)
                    .await
                    .map_err(|e| {
                        warn!(error = %e, "database connect failed");
                        e
                    })
                    .context("connect to database")?;
                info!("database connected");
                Ok::<PgPool, anyhow::Error>(pool)
            })
            .await
    }
}

pub async fn run_migrations(db: &Database) {
    let pool = match db.pool().await {
        Ok(pool) => pool,
        Err(e) => {
            warn!(error = %e, "database unavailable at startup; migrations skipped");
            return;
        }
    };
    if let Err(e) = sqlx::migrate!("./migrations").run(pool).await {
        warn!(error = %e, "migration failed; continuing");
    }
}
