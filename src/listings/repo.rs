use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::QueryBuilder;
use uuid::Uuid;

use super::{
    query::ListingQuery,
    repo_types::{Listing, ListingPatch, NewListing},
};
use crate::db::Database;

const LISTING_COLUMNS: &str = "id, title, category, price, original_price, images, college, \
     description, owner_id, owner_name, rating, reviews, quantity, created_at, updated_at";

#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn insert(&self, new: NewListing) -> anyhow::Result<Listing>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Listing>>;
    /// One page of matches plus the total number of matches.
    async fn find(&self, query: &ListingQuery) -> anyhow::Result<(Vec<Listing>, i64)>;
    async fn update(&self, id: Uuid, patch: ListingPatch) -> anyhow::Result<Option<Listing>>;
    /// `false` when nothing was deleted.
    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;
}

pub struct PgListingStore {
    db: Arc<Database>,
}

impl PgListingStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ListingStore for PgListingStore {
    async fn insert(&self, new: NewListing) -> anyhow::Result<Listing> {
        let pool = self.db.pool().await?;
        let listing = sqlx::query_as::<_, Listing>(&format!(
            r#"
            INSERT INTO listings
                (title, category, price, original_price, images, college, description,
                 owner_id, owner_name, quantity)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {LISTING_COLUMNS}
            "#
        ))
        .bind(&new.title)
        .bind(new.category.as_str())
        .bind(new.price)
        .bind(new.original_price)
        .bind(&new.images)
        .bind(&new.college)
        .bind(&new.description)
        .bind(new.owner_id)
        .bind(&new.owner_name)
        .bind(new.quantity)
        .fetch_one(pool)
        .await
        .context("insert listing")?;
        Ok(listing)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Listing>> {
        let pool = self.db.pool().await?;
        let listing = sqlx::query_as::<_, Listing>(&format!(
            "SELECT {LISTING_COLUMNS} FROM listings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("find listing")?;
        Ok(listing)
    }

    async fn find(&self, query: &ListingQuery) -> anyhow::Result<(Vec<Listing>, i64)> {
        let pool = self.db.pool().await?;

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM listings");
        query.filter.push_where(&mut count);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(pool)
            .await
            .context("count listings")?;

        let mut select = QueryBuilder::new(format!("SELECT {LISTING_COLUMNS} FROM listings"));
        query.filter.push_where(&mut select);
        query.sort.push_order_by(&mut select);
        select
            .push(" LIMIT ")
            .push_bind(query.limit)
            .push(" OFFSET ")
            .push_bind(query.offset());
        let items = select
            .build_query_as::<Listing>()
            .fetch_all(pool)
            .await
            .context("list listings")?;

        Ok((items, total))
    }

    async fn update(&self, id: Uuid, patch: ListingPatch) -> anyhow::Result<Option<Listing>> {
        let pool = self.db.pool().await?;
        let mut qb = QueryBuilder::new("UPDATE listings SET updated_at = now()");
        if let Some(title) = patch.title {
            qb.push(", title = ").push_bind(title);
        }
        if let Some(description) = patch.description {
            qb.push(", description = ").push_bind(description);
        }
        if let Some(category) = patch.category {
            qb.push(", category = ").push_bind(category.as_str());
        }
        if let Some(price) = patch.price {
            qb.push(", price = ").push_bind(price);
        }
        if let Some(original_price) = patch.original_price {
            qb.push(", original_price = ").push_bind(original_price);
        }
        if let Some(college) = patch.college {
            qb.push(", college = ").push_bind(college);
        }
        if let Some(quantity) = patch.quantity {
            qb.push(", quantity = ").push_bind(quantity);
        }
        if let Some(images) = patch.images {
            qb.push(", images = ").push_bind(images);
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(" RETURNING ").push(LISTING_COLUMNS);

        let listing = qb
            .build_query_as::<Listing>()
            .fetch_optional(pool)
            .await
            .context("update listing")?;
        Ok(listing)
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let pool = self.db.pool().await?;
        let result = sqlx::query("DELETE FROM listings WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .context("delete listing")?;
        Ok(result.rows_affected() > 0)
    }
}
