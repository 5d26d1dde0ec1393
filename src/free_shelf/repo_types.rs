use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// A readable text document shared on the free shelf.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FreeShelfEntry {
    pub id: Uuid,
    pub branch_id: String,
    pub title: String,
    pub description: String,
    pub content: String,
    pub file_name: String,
    pub owner_id: Uuid,
    pub owner_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewFreeShelfEntry {
    pub branch_id: String,
    pub title: String,
    pub description: String,
    pub content: String,
    pub file_name: String,
    pub owner_id: Uuid,
    pub owner_name: String,
}
