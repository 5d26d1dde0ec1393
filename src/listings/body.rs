//! Listing write bodies.
//!
//! `POST /listings` and `PUT /listings/:id` accept either JSON or
//! `multipart/form-data`. [`ListingBody`] picks the parser from the content type
//! and both paths converge on a [`PendingListing`], which is then validated for
//! creation or for a partial update.

use std::collections::HashMap;

use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
};
use serde::Deserialize;

use super::repo_types::{Category, ListingPatch};
use crate::{
    error::{ApiError, AppJson},
    images::{ImagePart, PLACEHOLDER_IMAGE},
};

pub const MIN_CREATE_IMAGES: usize = 3;

const MULTIPART_CREATE_ERROR: &str = "Invalid form data: title, description, category, college required, price must be > 0, and at least 3 images required";
const JSON_CREATE_ERROR: &str =
    "Invalid request: title, category, college required and price must be > 0";

/// A number that may arrive as a JSON number or as text (form fields, or JSON
/// clients that quote numbers).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NumberInput {
    Number(f64),
    Text(String),
}

impl NumberInput {
    /// `None` when unparseable or not finite.
    pub fn value(&self) -> Option<f64> {
        let n = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse().ok()?,
        };
        n.is_finite().then_some(n)
    }
}

/// JSON listing body. Unknown keys (including owner fields) are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingJson {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<NumberInput>,
    pub original_price: Option<NumberInput>,
    pub college: Option<String>,
    pub quantity: Option<NumberInput>,
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Default)]
pub struct ListingForm {
    pub fields: HashMap<String, String>,
    pub images: Vec<ImagePart>,
}

#[derive(Debug)]
pub enum ListingBody {
    Json(ListingJson),
    Multipart(ListingForm),
}

fn is_multipart(req: &Request) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
}

#[async_trait]
impl<S> FromRequest<S> for ListingBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if !is_multipart(&req) {
            let AppJson(json) = AppJson::<ListingJson>::from_request(req, state).await?;
            return Ok(Self::Json(json));
        }

        let mut multipart = Multipart::from_request(req, state).await?;
        let mut form = ListingForm::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name == "images" || name == "images[]" {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let body = field.bytes().await?;
                let part = if file_name.is_none() || body.is_empty() {
                    ImagePart::NotAFile
                } else {
                    ImagePart::File {
                        body,
                        content_type,
                        file_name,
                    }
                };
                form.images.push(part);
            } else {
                let value = field.text().await?;
                form.fields.entry(name).or_insert(value);
            }
        }
        Ok(Self::Multipart(form))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    Multipart,
}

/// Either parse path, normalised. Text fields are trimmed; a blank value stays
/// `Some("")` so an update can tell "sent empty" from "not sent".
#[derive(Debug)]
pub struct PendingListing {
    pub kind: BodyKind,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<NumberInput>,
    pub original_price: Option<NumberInput>,
    pub college: Option<String>,
    pub quantity: Option<NumberInput>,
    /// Image references given directly (JSON only).
    pub image_urls: Option<Vec<String>>,
    /// Uploaded parts (multipart only).
    pub image_parts: Vec<ImagePart>,
    pub keep_existing_images: bool,
}

fn text(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string())
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn present_number(value: Option<NumberInput>) -> Option<NumberInput> {
    value.filter(|n| !matches!(n, NumberInput::Text(t) if t.trim().is_empty()))
}

/// A supplied update field may not be blank.
fn supplied(name: &str, value: Option<String>) -> Result<Option<String>, ApiError> {
    match value {
        Some(v) if v.is_empty() => Err(ApiError::bad_request(format!("{name} must not be blank"))),
        other => Ok(other),
    }
}

impl From<ListingBody> for PendingListing {
    fn from(body: ListingBody) -> Self {
        match body {
            ListingBody::Json(json) => Self {
                kind: BodyKind::Json,
                title: text(json.title),
                description: text(json.description),
                category: text(json.category),
                price: json.price,
                original_price: json.original_price,
                college: text(json.college),
                quantity: json.quantity,
                image_urls: json.images.map(|urls| {
                    urls.into_iter()
                        .map(|u| u.trim().to_string())
                        .filter(|u| !u.is_empty())
                        .collect()
                }),
                image_parts: Vec::new(),
                keep_existing_images: false,
            },
            ListingBody::Multipart(mut form) => {
                let mut take = |key: &str| text(form.fields.remove(key));
                let title = take("title");
                let description = take("description");
                let category = take("category");
                let price = take("price").map(NumberInput::Text);
                let original_price = take("originalPrice").map(NumberInput::Text);
                let college = take("college");
                let quantity = take("quantity").map(NumberInput::Text);
                let keep_existing_images = take("keepExistingImages")
                    .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1");
                Self {
                    kind: BodyKind::Multipart,
                    title,
                    description,
                    category,
                    price,
                    original_price,
                    college,
                    quantity,
                    image_urls: None,
                    image_parts: form.images,
                    keep_existing_images,
                }
            }
        }
    }
}

/// Where a new listing's images come from.
#[derive(Debug)]
pub enum ImageSource {
    Urls(Vec<String>),
    Uploads(Vec<ImagePart>),
}

#[derive(Debug)]
pub struct ValidListing {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub price: f64,
    pub original_price: Option<f64>,
    pub college: String,
    pub quantity: i32,
    pub images: ImageSource,
}

/// How an update changes the image list.
#[derive(Debug)]
pub enum ImageUpdate {
    Unchanged,
    Replace(Vec<String>),
    Upload {
        parts: Vec<ImagePart>,
        keep_existing: bool,
    },
}

fn positive_price(input: Option<&NumberInput>) -> Option<f64> {
    input.and_then(NumberInput::value).filter(|p| *p > 0.0)
}

fn original_price(input: Option<NumberInput>) -> Result<Option<f64>, ApiError> {
    match input {
        None => Ok(None),
        Some(n) => match n.value() {
            Some(v) if v >= 0.0 => Ok(Some(v)),
            _ => Err(ApiError::bad_request("originalPrice must be a number >= 0")),
        },
    }
}

fn quantity(input: Option<NumberInput>) -> Result<Option<i32>, ApiError> {
    match input {
        None => Ok(None),
        Some(n) => match n.value() {
            Some(v) if v >= 0.0 && v.fract() == 0.0 && v <= i32::MAX as f64 => Ok(Some(v as i32)),
            _ => Err(ApiError::bad_request("quantity must be a whole number >= 0")),
        },
    }
}

fn category(raw: &str) -> Result<Category, ApiError> {
    Category::parse(raw).ok_or_else(|| ApiError::bad_request("Invalid category"))
}

impl PendingListing {
    /// Checks for `POST /listings`. Nothing is written before this passes.
    pub fn validate_create(self) -> Result<ValidListing, ApiError> {
        let price = positive_price(self.price.as_ref());
        let title = present(self.title);
        let description = present(self.description);
        let category_raw = present(self.category);
        let college = present(self.college);
        let (title, category_raw, college, price) = match self.kind {
            BodyKind::Multipart => {
                let complete = title.is_some()
                    && description.is_some()
                    && category_raw.is_some()
                    && college.is_some()
                    && price.is_some()
                    && self.image_parts.len() >= MIN_CREATE_IMAGES;
                match (complete, title, category_raw, college, price) {
                    (true, Some(t), Some(c), Some(col), Some(p)) => (t, c, col, p),
                    _ => return Err(ApiError::bad_request(MULTIPART_CREATE_ERROR)),
                }
            }
            BodyKind::Json => match (title, category_raw, college, price) {
                (Some(t), Some(c), Some(col), Some(p)) => (t, c, col, p),
                _ => return Err(ApiError::bad_request(JSON_CREATE_ERROR)),
            },
        };

        let images = match self.kind {
            BodyKind::Multipart => ImageSource::Uploads(self.image_parts),
            BodyKind::Json => match self.image_urls {
                Some(urls) if !urls.is_empty() => ImageSource::Urls(urls),
                _ => ImageSource::Urls(vec![PLACEHOLDER_IMAGE.to_string()]),
            },
        };

        Ok(ValidListing {
            title,
            description: description.unwrap_or_default(),
            category: category(&category_raw)?,
            price,
            original_price: original_price(present_number(self.original_price))?,
            college,
            quantity: quantity(present_number(self.quantity))?.unwrap_or(1),
            images,
        })
    }

    /// Checks for `PUT /listings/:id`. Only supplied fields are validated, and a
    /// supplied field must carry a value.
    pub fn validate_patch(self) -> Result<(ListingPatch, ImageUpdate), ApiError> {
        let title = supplied("title", self.title)?;
        let description = supplied("description", self.description)?;
        let college = supplied("college", self.college)?;
        let price = match &self.price {
            None => None,
            Some(_) => Some(
                positive_price(self.price.as_ref())
                    .ok_or_else(|| ApiError::bad_request("price must be > 0"))?,
            ),
        };
        let category = supplied("category", self.category)?
            .as_deref()
            .map(category)
            .transpose()?;

        let images = match self.kind {
            BodyKind::Json => match self.image_urls {
                None => ImageUpdate::Unchanged,
                Some(urls) if urls.is_empty() => {
                    return Err(ApiError::bad_request("images must not be empty"))
                }
                Some(urls) => ImageUpdate::Replace(urls),
            },
            BodyKind::Multipart if self.image_parts.is_empty() => ImageUpdate::Unchanged,
            BodyKind::Multipart => ImageUpdate::Upload {
                parts: self.image_parts,
                keep_existing: self.keep_existing_images,
            },
        };

        let patch = ListingPatch {
            title,
            description,
            category,
            price,
            original_price: original_price(self.original_price)?,
            college,
            quantity: quantity(self.quantity)?,
            images: None,
        };
        Ok((patch, images))
    }
}
