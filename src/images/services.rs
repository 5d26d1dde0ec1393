use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::storage::StorageClient;

pub const PLACEHOLDER_IMAGE: &str = "/placeholder.svg";
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// One `images` form part as received.
#[derive(Debug, Clone)]
pub enum ImagePart {
    File {
        body: Bytes,
        content_type: Option<String>,
        file_name: Option<String>,
    },
    /// A plain form value or an empty upload where a file was expected.
    NotAFile,
}

/// Resolve every part to an image reference, keeping positions. A part never
/// fails the batch: remote URL if the upload works, inline data URL if storage
/// is missing or refuses, placeholder for anything that is not a file.
pub async fn ingest_images(
    storage: Option<&dyn StorageClient>,
    owner: Uuid,
    parts: Vec<ImagePart>,
) -> Vec<String> {
    let mut out = Vec::with_capacity(parts.len());
    for (index, part) in parts.into_iter().enumerate() {
        let reference = match part {
            ImagePart::NotAFile => {
                warn!(index, "image part is not a file; using placeholder");
                PLACEHOLDER_IMAGE.to_string()
            }
            ImagePart::File {
                body,
                content_type,
                file_name,
            } => {
                let mime = content_type
                    .filter(|ct| !ct.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string());
                resolve_file(storage, owner, index, body, &mime, file_name.as_deref()).await
            }
        };
        out.push(reference);
    }
    out
}

async fn resolve_file(
    storage: Option<&dyn StorageClient>,
    owner: Uuid,
    index: usize,
    body: Bytes,
    mime: &str,
    file_name: Option<&str>,
) -> String {
    if let Some(storage) = storage {
        let ext = ext_from_mime(mime).unwrap_or("bin");
        let key = format!("listings/{}/{}.{}", owner, Uuid::new_v4(), ext);
        match storage.put_object(&key, body.clone(), mime).await {
            Ok(()) => {
                debug!(index, %key, "image uploaded");
                return storage.public_url(&key);
            }
            Err(e) => {
                warn!(index, file_name = file_name.unwrap_or("-"), error = %e, "image upload failed; storing inline");
            }
        }
    }
    inline_data_url(mime, &body)
}

pub fn inline_data_url(mime: &str, body: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(body))
}

/// Final image list after an edit. `None` when the edit carried no image parts
/// and the stored list should stay as is.
pub fn merge_images(existing: &[String], fresh: Vec<String>, keep_existing: bool) -> Option<Vec<String>> {
    if fresh.is_empty() {
        return None;
    }
    if keep_existing {
        let mut merged = existing.to_vec();
        merged.extend(fresh);
        Some(merged)
    } else {
        Some(fresh)
    }
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/svg+xml" => Some("svg"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}
