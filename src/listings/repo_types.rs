use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Fixed set of listing categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Notes,
    Books,
    Electronics,
    RentalLaptops,
    LabUniforms,
    Stationery,
    IdCardTags,
    LabEquipment,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Notes,
        Category::Books,
        Category::Electronics,
        Category::RentalLaptops,
        Category::LabUniforms,
        Category::Stationery,
        Category::IdCardTags,
        Category::LabEquipment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Notes => "Notes",
            Self::Books => "Books",
            Self::Electronics => "Electronics",
            Self::RentalLaptops => "Rental Laptops",
            Self::LabUniforms => "Lab Uniforms",
            Self::Stationery => "Stationery",
            Self::IdCardTags => "ID Card Tags",
            Self::LabEquipment => "Lab Equipment",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL.into_iter().find(|c| c.as_str() == raw)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: Uuid,
    pub title: String,
    pub category: String,
    pub price: f64,
    pub original_price: Option<f64>,
    pub images: Vec<String>,
    pub college: String,
    pub description: String,
    pub owner_id: Uuid,
    pub owner_name: String, // snapshot taken at creation
    pub rating: f64,
    pub reviews: i32,
    pub quantity: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewListing {
    pub title: String,
    pub category: Category,
    pub price: f64,
    pub original_price: Option<f64>,
    pub images: Vec<String>,
    pub college: String,
    pub description: String,
    pub owner_id: Uuid,
    pub owner_name: String,
    pub quantity: i32,
}

/// Fields a listing owner may change. `None` leaves the column untouched. Owner
/// fields are not patchable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<Category>,
    pub price: Option<f64>,
    pub original_price: Option<f64>,
    pub college: Option<String>,
    pub quantity: Option<i32>,
    pub images: Option<Vec<String>>,
}
