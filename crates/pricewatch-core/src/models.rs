use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;
use uuid::Uuid;

/// Static identity of a catalog origin, declared by its adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceInfo {
    /// Human-readable retailer name (e.g., "Books to Scrape")
    pub name: &'static str,
    /// Unique domain (e.g., "books.toscrape.com")
    pub domain: &'static str,
}

/// A persisted catalog origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub name: String,
    pub domain: String,
    pub created_at: DateTime<Utc>,
}

/// A persisted catalog item, keyed by (source_id, sku).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub source_id: Uuid,
    pub name: String,
    pub url: String,
    pub sku: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One immutable time-series sample of a product's price and stock state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceObservation {
    pub id: Uuid,
    pub product_id: Uuid,
    pub price: Option<f64>,
    pub currency: String,
    pub in_stock: bool,
    pub observed_at: DateTime<Utc>,
}

/// Raw product card as extracted from a page, before validation.
///
/// Every field is optional: extraction fills what it finds and the
/// validator decides whether the record is usable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateRecord {
    pub name: Option<String>,
    pub url: Option<String>,
    pub sku: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub in_stock: Option<bool>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<i64>,
    pub source_name: Option<String>,
    pub source_domain: Option<String>,
}

impl CandidateRecord {
    /// Start a candidate stamped with its adapter's source identity.
    pub fn for_source(source: SourceInfo) -> Self {
        Self {
            source_name: Some(source.name.to_string()),
            source_domain: Some(source.domain.to_string()),
            ..Self::default()
        }
    }
}

/// A validated product observation, ready for the persistence merger.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    pub source_name: String,
    pub source_domain: String,
    pub name: String,
    pub url: Url,
    pub sku: String,
    pub price: Option<f64>,
    pub currency: String,
    pub in_stock: bool,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<i32>,
    pub observed_at: DateTime<Utc>,
}

/// Result of merging one record into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    pub source_id: Uuid,
    pub product_id: Uuid,
    pub observation_id: Uuid,
    /// True when this merge created the product row.
    pub product_created: bool,
}

/// Product count for one category label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySummary {
    /// `None` groups products stored without a category.
    pub category: Option<String>,
    pub product_count: i64,
}

/// Row counts across the three stored relations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub sources: i64,
    pub products: i64,
    pub observations: i64,
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
