use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Router,
};
use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{
    body::{ImageSource, ImageUpdate, ListingBody, PendingListing},
    query::{ListingParams, ListingQuery},
    repo_types::{Listing, NewListing},
};
use crate::{
    app::UPLOAD_BODY_LIMIT,
    auth::{guard::require_owner, AuthUser},
    error::{ApiError, AppQuery, Envelope},
    images::{ingest_images, merge_images},
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/listings", get(list_listings))
        .route("/listings/:id", get(get_listing))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/listings", post(create_listing))
        .route("/listings/:id", put(update_listing).delete(delete_listing))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
}

/// Ids that do not parse cannot name a stored listing.
fn listing_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::NotFound)
}

fn caller_id(sub: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(sub.trim()).map_err(|_| ApiError::unauthorized())
}

#[instrument(skip(state))]
pub async fn list_listings(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<ListingParams>,
) -> Result<Envelope<Vec<Listing>>, ApiError> {
    let query = ListingQuery::build(&params);
    let (items, total) = state.listings.find(&query).await?;
    Ok(Envelope::data(items)
        .with("page", json!(query.page))
        .with("limit", json!(query.limit))
        .with("total", json!(total)))
}

#[instrument(skip(state))]
pub async fn get_listing(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Envelope<Listing>, ApiError> {
    let id = listing_id(&id)?;
    let listing = state
        .listings
        .find_by_id(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Envelope::data(listing))
}

#[instrument(skip(state, session, body))]
pub async fn create_listing(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    body: ListingBody,
) -> Result<(StatusCode, Envelope<Listing>), ApiError> {
    let owner_id = caller_id(&session.sub)?;
    let valid = PendingListing::from(body).validate_create().map_err(|e| {
        warn!(user_id = %owner_id, error = %e, "listing rejected");
        e
    })?;

    let images = match valid.images {
        ImageSource::Urls(urls) => urls,
        ImageSource::Uploads(parts) => {
            info!(count = parts.len(), "processing listing images");
            ingest_images(state.storage.as_deref(), owner_id, parts).await
        }
    };

    let uploaded: Vec<String> = images
        .iter()
        .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
        .cloned()
        .collect();
    let listing = state
        .listings
        .insert(NewListing {
            title: valid.title,
            category: valid.category,
            price: valid.price,
            original_price: valid.original_price,
            images,
            college: valid.college,
            description: valid.description,
            owner_id,
            owner_name: session.name.clone(),
            quantity: valid.quantity,
        })
        .await
        .map_err(|e| {
            if !uploaded.is_empty() {
                error!(user_id = %owner_id, orphaned = ?uploaded, "listing insert failed after image upload");
            }
            e
        })?;

    info!(listing_id = %listing.id, user_id = %owner_id, "listing created");
    Ok((StatusCode::CREATED, Envelope::data(listing)))
}

#[instrument(skip(state, session, body))]
pub async fn update_listing(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Path(id): Path<String>,
    body: ListingBody,
) -> Result<Envelope<Listing>, ApiError> {
    let (mut patch, image_update) = PendingListing::from(body).validate_patch()?;

    let id = listing_id(&id)?;
    let existing = state
        .listings
        .find_by_id(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    require_owner(existing.owner_id, &session)?;

    patch.images = match image_update {
        ImageUpdate::Unchanged => None,
        ImageUpdate::Replace(urls) => Some(urls),
        ImageUpdate::Upload {
            parts,
            keep_existing,
        } => {
            let fresh = ingest_images(state.storage.as_deref(), existing.owner_id, parts).await;
            merge_images(&existing.images, fresh, keep_existing)
        }
    };

    let updated = state
        .listings
        .update(id, patch)
        .await?
        .ok_or(ApiError::NotFound)?;
    info!(listing_id = %id, "listing updated");
    Ok(Envelope::data(updated))
}

#[instrument(skip(state, session))]
pub async fn delete_listing(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Path(id): Path<String>,
) -> Result<Envelope<()>, ApiError> {
    let id = listing_id(&id)?;
    let existing = state
        .listings
        .find_by_id(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    require_owner(existing.owner_id, &session)?;

    state.listings.delete(id).await?;
    info!(listing_id = %id, "listing deleted");
    Ok(Envelope::ok())
}
