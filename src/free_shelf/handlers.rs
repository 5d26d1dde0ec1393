use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{delete, get},
    Router,
};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::repo_types::{FreeShelfEntry, NewFreeShelfEntry};
use crate::{
    app::UPLOAD_BODY_LIMIT,
    auth::{guard::require_owner, AuthUser},
    error::{ApiError, AppQuery, Envelope},
    state::AppState,
};

const NOT_MULTIPART: &str = "Invalid content type. Expected multipart/form-data.";
const MISSING_FIELDS: &str = "branchId, title and file are required.";
const UNREADABLE_FILE: &str = "Failed to read uploaded file. Please upload a text-based file.";
const EMPTY_FILE: &str =
    "Uploaded file is empty or unsupported. Please upload a text file (.txt, .md, etc.).";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/free-shelf",
            get(list_entries)
                .post(create_entry)
                .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/free-shelf/:id", delete(delete_entry))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShelfQuery {
    pub branch_id: Option<String>,
}

#[instrument(skip(state))]
pub async fn list_entries(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ShelfQuery>,
) -> Result<Envelope<Vec<FreeShelfEntry>>, ApiError> {
    let branch = query
        .branch_id
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty());
    let entries = state.free_shelf.list(branch).await?;
    Ok(Envelope::data(entries))
}

/// What arrived in the `file` part.
enum Upload {
    Text { content: String, file_name: String },
    Unreadable,
    NotAFile,
}

#[instrument(skip(state, session, multipart))]
pub async fn create_entry(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Envelope<FreeShelfEntry>), ApiError> {
    let owner_id = Uuid::parse_str(session.sub.trim()).map_err(|_| ApiError::unauthorized())?;
    let mut multipart = multipart.map_err(|e| {
        debug!(error = %e, "free shelf upload without multipart body");
        ApiError::bad_request(NOT_MULTIPART)
    })?;

    let (mut branch_id, mut title, mut description) = (None, None, None);
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().map(str::to_string);
                upload = Some(match (file_name, field.bytes().await) {
                    (None, _) => Upload::NotAFile,
                    (Some(_), Err(e)) => {
                        warn!(error = %e, "failed to read free shelf upload");
                        Upload::Unreadable
                    }
                    (Some(file_name), Ok(bytes)) => match String::from_utf8(bytes.to_vec()) {
                        Ok(content) => Upload::Text { content, file_name },
                        Err(_) => Upload::Unreadable,
                    },
                });
            }
            "branchId" => branch_id = Some(field.text().await?),
            "title" => title = Some(field.text().await?),
            "description" => description = Some(field.text().await?),
            _ => {}
        }
    }

    let trimmed = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    let (Some(branch_id), Some(title), Some(upload)) = (trimmed(branch_id), trimmed(title), upload)
    else {
        return Err(ApiError::bad_request(MISSING_FIELDS));
    };
    let (content, file_name) = match upload {
        Upload::Unreadable => return Err(ApiError::bad_request(UNREADABLE_FILE)),
        Upload::NotAFile => return Err(ApiError::bad_request(EMPTY_FILE)),
        Upload::Text { content, .. } if content.trim().is_empty() => {
            return Err(ApiError::bad_request(EMPTY_FILE))
        }
        Upload::Text { content, file_name } => (content, file_name),
    };

    let entry = state
        .free_shelf
        .create(NewFreeShelfEntry {
            branch_id,
            title,
            description: trimmed(description).unwrap_or_default(),
            content,
            file_name,
            owner_id,
            owner_name: session.name.clone(),
        })
        .await?;

    info!(entry_id = %entry.id, branch = %entry.branch_id, "free shelf entry created");
    Ok((StatusCode::CREATED, Envelope::data(entry)))
}

/// Deleting something already gone succeeds, so repeated deletes are harmless.
#[instrument(skip(state, session))]
pub async fn delete_entry(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Path(id): Path<String>,
) -> Result<Envelope<()>, ApiError> {
    let Ok(id) = Uuid::parse_str(id.trim()) else {
        return Ok(Envelope::ok());
    };
    let Some(existing) = state.free_shelf.find_by_id(id).await? else {
        debug!(entry_id = %id, "free shelf entry already gone");
        return Ok(Envelope::ok());
    };
    require_owner(existing.owner_id, &session)?;

    state.free_shelf.delete(id).await?;
    info!(entry_id = %id, "free shelf entry deleted");
    Ok(Envelope::ok())
}
