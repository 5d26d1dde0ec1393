pub mod services;

pub use services::{ingest_images, merge_images, ImagePart, PLACEHOLDER_IMAGE};
