use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{NewUser, ProfileUpdate, User};
use crate::db::Database;

const USER_COLUMNS: &str = "id, name, email, password_hash, college, phone, email_verified, \
     verification_token, reset_token, reset_token_expires, created_at";

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Returns `None` when the email is already registered.
    async fn create(&self, new: NewUser) -> anyhow::Result<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> anyhow::Result<Option<User>>;
    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires: OffsetDateTime,
    ) -> anyhow::Result<()>;
    /// Swap in a new password hash if `token` is live at `now`, clearing the token.
    /// Returns the user id on success.
    async fn consume_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> anyhow::Result<Option<Uuid>>;
    /// Mark the holder of `token` verified and clear the token.
    async fn consume_verification_token(&self, token: &str) -> anyhow::Result<Option<Uuid>>;
}

pub struct PgUserStore {
    db: Arc<Database>,
}

impl PgUserStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, new: NewUser) -> anyhow::Result<Option<User>> {
        let pool = self.db.pool().await?;
        let result = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, email, password_hash, college, phone, email_verified)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.college)
        .bind(&new.phone)
        .bind(new.email_verified)
        .fetch_one(pool)
        .await;

        match result {
            Ok(user) => Ok(Some(user)),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e).context("insert user"),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let pool = self.db.pool().await?;
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let pool = self.db.pool().await?;
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> anyhow::Result<Option<User>> {
        let pool = self.db.pool().await?;
        let mut qb = QueryBuilder::new("UPDATE users SET updated_at = now()");
        if let Some(name) = update.name {
            qb.push(", name = ").push_bind(name);
        }
        if let Some(phone) = update.phone {
            qb.push(", phone = ").push_bind(phone);
        }
        if let Some(college) = update.college {
            qb.push(", college = ").push_bind(college);
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(" RETURNING ").push(USER_COLUMNS);

        let user = qb
            .build_query_as::<User>()
            .fetch_optional(pool)
            .await
            .context("update user profile")?;
        Ok(user)
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires: OffsetDateTime,
    ) -> anyhow::Result<()> {
        let pool = self.db.pool().await?;
        sqlx::query(
            "UPDATE users SET reset_token = $2, reset_token_expires = $3, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(token)
        .bind(expires)
        .execute(pool)
        .await
        .context("store reset token")?;
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> anyhow::Result<Option<Uuid>> {
        let pool = self.db.pool().await?;
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE users
               SET password_hash = $3,
                   reset_token = NULL,
                   reset_token_expires = NULL,
                   updated_at = now()
             WHERE reset_token = $1
               AND reset_token_expires > $2
            RETURNING id
            "#,
        )
        .bind(token)
        .bind(now)
        .bind(password_hash)
        .fetch_optional(pool)
        .await
        .context("consume reset token")?;
        Ok(id)
    }

    async fn consume_verification_token(&self, token: &str) -> anyhow::Result<Option<Uuid>> {
        let pool = self.db.pool().await?;
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE users
               SET email_verified = TRUE,
                   verification_token = NULL,
                   updated_at = now()
             WHERE verification_token = $1
            RETURNING id
            "#,
        )
        .bind(token)
        .fetch_optional(pool)
        .await
        .context("consume verification token")?;
        Ok(id)
    }
}
