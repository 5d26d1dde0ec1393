use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::types::Json;
use uuid::Uuid;

use super::repo_types::{NewOrder, Order, OrderRow, STATUS_PAID};
use crate::db::Database;

const ORDER_COLUMNS: &str =
    "id, user_id, items, subtotal, tax, total, payment_method, status, created_at";

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create(&self, new: NewOrder) -> anyhow::Result<Order>;
    /// The user's orders, newest first.
    async fn list_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Order>>;
}

pub struct PgOrderStore {
    db: Arc<Database>,
}

impl PgOrderStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create(&self, new: NewOrder) -> anyhow::Result<Order> {
        let pool = self.db.pool().await?;
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            INSERT INTO orders (user_id, items, subtotal, tax, total, payment_method, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(new.user_id)
        .bind(Json(&new.items))
        .bind(new.subtotal)
        .bind(new.tax)
        .bind(new.total)
        .bind(&new.payment_method)
        .bind(STATUS_PAID)
        .fetch_one(pool)
        .await
        .context("insert order")?;
        Ok(row.into())
    }

    async fn list_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Order>> {
        let pool = self.db.pool().await?;
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("list orders")?;
        Ok(rows.into_iter().map(Order::from).collect())
    }
}
