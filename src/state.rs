use std::sync::Arc;

use tracing::info;

use crate::auth::repo::{PgUserStore, UserStore};
use crate::config::AppConfig;
use crate::db::Database;
use crate::email::{EmailSender, HttpEmailSender, LogEmailSender};
use crate::free_shelf::repo::{FreeShelfStore, PgFreeShelfStore};
use crate::listings::repo::{ListingStore, PgListingStore};
use crate::orders::repo::{OrderStore, PgOrderStore};
use crate::storage::{Storage, StorageClient};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub listings: Arc<dyn ListingStore>,
    pub orders: Arc<dyn OrderStore>,
    pub free_shelf: Arc<dyn FreeShelfStore>,
    /// `None` when no object storage is configured; images are then inlined.
    pub storage: Option<Arc<dyn StorageClient>>,
    pub email: Arc<dyn EmailSender>,
}

impl AppState {
    pub async fn init(config: Arc<AppConfig>, db: Arc<Database>) -> anyhow::Result<Self> {
        let storage = match &config.s3 {
            Some(s3) => {
                info!(bucket = %s3.bucket, "remote image storage enabled");
                Some(Arc::new(Storage::new(s3).await?) as Arc<dyn StorageClient>)
            }
            None => {
                info!("no image storage configured; images will be stored inline");
                None
            }
        };

        let email: Arc<dyn EmailSender> = match &config.email {
            Some(email) => Arc::new(HttpEmailSender::new(email.clone())),
            None => Arc::new(LogEmailSender),
        };

        Ok(Self {
            users: Arc::new(PgUserStore::new(db.clone())),
            listings: Arc::new(PgListingStore::new(db.clone())),
            orders: Arc::new(PgOrderStore::new(db.clone())),
            free_shelf: Arc::new(PgFreeShelfStore::new(db)),
            config,
            storage,
            email,
        })
    }
}
