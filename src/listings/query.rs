//! Listing search: turns raw query-string parameters into a store-agnostic
//! filter, sort and page window.
//!
//! The same [`ListingQuery`] value drives the Postgres store (rendered through
//! `QueryBuilder`) and the in-memory store used in tests, so both agree on what a
//! set of parameters means.

use serde::Deserialize;
use sqlx::{Postgres, QueryBuilder};

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

const ALL_CATEGORIES: &str = "All";
const ALL_COLLEGES: &str = "All Colleges";

/// Raw `GET /listings` parameters. Everything is a string so that a bad number
/// falls back to its default instead of failing the request.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ListingParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub category: Option<String>,
    pub college: Option<String>,
    pub q: Option<String>,
    pub sort: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingField {
    Title,
    Category,
    College,
    Price,
    Rating,
    Reviews,
    Quantity,
    CreatedAt,
}

impl ListingField {
    pub fn column(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Category => "category",
            Self::College => "college",
            Self::Price => "price",
            Self::Rating => "rating",
            Self::Reviews => "reviews",
            Self::Quantity => "quantity",
            Self::CreatedAt => "created_at",
        }
    }

    /// Fields a client may sort on.
    fn sortable(name: &str) -> Option<Self> {
        match name {
            "price" => Some(Self::Price),
            "rating" => Some(Self::Rating),
            "reviews" => Some(Self::Reviews),
            "title" => Some(Self::Title),
            "quantity" => Some(Self::Quantity),
            "createdAt" | "created_at" => Some(Self::CreatedAt),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals { field: ListingField, value: String },
    ContainsIgnoreCase { field: ListingField, needle: String },
    AnyOf(Vec<Condition>),
}

/// Conjunction of conditions. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingFilter {
    pub all_of: Vec<Condition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: ListingField,
    pub direction: Direction,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            field: ListingField::CreatedAt,
            direction: Direction::Descending,
        }
    }
}

impl SortSpec {
    /// `price`, `-price`, ... Unknown fields give the default newest-first order.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Self::default();
        };
        let (name, direction) = match raw.strip_prefix('-') {
            Some(rest) => (rest, Direction::Descending),
            None => (raw, Direction::Ascending),
        };
        match ListingField::sortable(name) {
            Some(field) => Self { field, direction },
            None => Self::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListingQuery {
    pub filter: ListingFilter,
    pub sort: SortSpec,
    pub page: i64,
    pub limit: i64,
}

impl ListingQuery {
    pub fn build(params: &ListingParams) -> Self {
        let mut all_of = Vec::new();

        if let Some(category) = present(params.category.as_deref()) {
            if category != ALL_CATEGORIES {
                all_of.push(Condition::Equals {
                    field: ListingField::Category,
                    value: category.to_string(),
                });
            }
        }
        if let Some(college) = present(params.college.as_deref()) {
            if college != ALL_COLLEGES {
                all_of.push(Condition::Equals {
                    field: ListingField::College,
                    value: college.to_string(),
                });
            }
        }
        if let Some(q) = present(params.q.as_deref()) {
            all_of.push(Condition::AnyOf(vec![
                Condition::ContainsIgnoreCase {
                    field: ListingField::Title,
                    needle: q.to_string(),
                },
                Condition::ContainsIgnoreCase {
                    field: ListingField::Category,
                    needle: q.to_string(),
                },
            ]));
        }

        let page = parse_int(params.page.as_deref())
            .filter(|p| *p >= 1)
            .unwrap_or(1);
        let limit = parse_int(params.limit.as_deref())
            .map(|l| l.clamp(1, MAX_LIMIT))
            .unwrap_or(DEFAULT_LIMIT);

        Self {
            filter: ListingFilter { all_of },
            sort: SortSpec::parse(params.sort.as_deref()),
            page,
            limit,
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_int(value: Option<&str>) -> Option<i64> {
    value?.trim().parse().ok()
}

/// Escape `LIKE` metacharacters so the needle matches literally.
fn like_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

fn push_condition(qb: &mut QueryBuilder<'_, Postgres>, condition: &Condition) {
    match condition {
        Condition::Equals { field, value } => {
            qb.push(field.column()).push(" = ").push_bind(value.clone());
        }
        Condition::ContainsIgnoreCase { field, needle } => {
            qb.push(field.column())
                .push(" ILIKE ")
                .push_bind(like_pattern(needle))
                .push(" ESCAPE '\\'");
        }
        Condition::AnyOf(options) => {
            qb.push("(");
            for (i, option) in options.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                push_condition(qb, option);
            }
            qb.push(")");
        }
    }
}

impl ListingFilter {
    /// Appends ` WHERE ...` (or nothing when unconstrained).
    pub fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        for (i, condition) in self.all_of.iter().enumerate() {
            qb.push(if i == 0 { " WHERE " } else { " AND " });
            push_condition(qb, condition);
        }
    }
}

impl SortSpec {
    /// Appends ` ORDER BY ...` with `id` as a tiebreak so pages are stable.
    pub fn push_order_by(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        let dir = match self.direction {
            Direction::Ascending => "ASC",
            Direction::Descending => "DESC",
        };
        qb.push(" ORDER BY ")
            .push(self.field.column())
            .push(" ")
            .push(dir)
            .push(", id ")
            .push(dir);
    }
}
