use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use uuid::Uuid;

use super::repo_types::{FreeShelfEntry, NewFreeShelfEntry};
use crate::db::Database;

const ENTRY_COLUMNS: &str =
    "id, branch_id, title, description, content, file_name, owner_id, owner_name, created_at";

#[async_trait]
pub trait FreeShelfStore: Send + Sync {
    async fn create(&self, new: NewFreeShelfEntry) -> anyhow::Result<FreeShelfEntry>;
    /// Newest first, optionally restricted to one branch.
    async fn list(&self, branch_id: Option<&str>) -> anyhow::Result<Vec<FreeShelfEntry>>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<FreeShelfEntry>>;
    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;
}

pub struct PgFreeShelfStore {
    db: Arc<Database>,
}

impl PgFreeShelfStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FreeShelfStore for PgFreeShelfStore {
    async fn create(&self, new: NewFreeShelfEntry) -> anyhow::Result<FreeShelfEntry> {
        let pool = self.db.pool().await?;
        let entry = sqlx::query_as::<_, FreeShelfEntry>(&format!(
            r#"
            INSERT INTO free_shelf_entries
                (branch_id, title, description, content, file_name, owner_id, owner_name)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {ENTRY_COLUMNS}
            "#
        ))
        .bind(&new.branch_id)
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.content)
        .bind(&new.file_name)
        .bind(new.owner_id)
        .bind(&new.owner_name)
        .fetch_one(pool)
        .await
        .context("insert free shelf entry")?;
        Ok(entry)
    }

    async fn list(&self, branch_id: Option<&str>) -> anyhow::Result<Vec<FreeShelfEntry>> {
        let pool = self.db.pool().await?;
        let entries = sqlx::query_as::<_, FreeShelfEntry>(&format!(
            r#"
            SELECT {ENTRY_COLUMNS}
              FROM free_shelf_entries
             WHERE ($1::text IS NULL OR branch_id = $1)
             ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(branch_id)
        .fetch_all(pool)
        .await
        .context("list free shelf entries")?;
        Ok(entries)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<FreeShelfEntry>> {
        let pool = self.db.pool().await?;
        let entry = sqlx::query_as::<_, FreeShelfEntry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM free_shelf_entries WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("find free shelf entry")?;
        Ok(entry)
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let pool = self.db.pool().await?;
        let result = sqlx::query("DELETE FROM free_shelf_entries WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .context("delete free shelf entry")?;
        Ok(result.rows_affected() > 0)
    }
}
