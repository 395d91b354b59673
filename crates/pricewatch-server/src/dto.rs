use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pricewatch_core::job::CrawlJob;
use pricewatch_core::models::{CategorySummary, PriceObservation, Product};
use pricewatch_core::runner::{SourceReport, SourceStats};

// ---------------------------------------------------------------------------
// Crawl jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateCrawlRequest {
    /// Source keys to crawl, as listed by `GET /v1/sources`
    pub sources: Vec<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CreateCrawlResponse {
    pub job_id: Uuid,
    pub status: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CrawlStatsResponse {
    pub pages_fetched: u64,
    pub branches_failed: u64,
    pub records_extracted: u64,
    pub records_skipped: u64,
    pub records_rejected: u64,
    pub observations_saved: u64,
    pub persistence_failures: u64,
}

impl From<SourceStats> for CrawlStatsResponse {
    fn from(stats: SourceStats) -> Self {
        Self {
            pages_fetched: stats.pages_fetched,
            branches_failed: stats.branches_failed,
            records_extracted: stats.records_extracted,
            records_skipped: stats.records_skipped,
            records_rejected: stats.records_rejected,
            observations_saved: stats.observations_saved,
            persistence_failures: stats.persistence_failures,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SourceResultResponse {
    /// `success` or `failed`
    pub status: String,
    pub stats: CrawlStatsResponse,
    pub error: Option<String>,
}

impl From<SourceReport> for SourceResultResponse {
    fn from(report: SourceReport) -> Self {
        Self {
            status: report.status.to_string(),
            stats: report.stats.into(),
            error: report.error,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CrawlJobResponse {
    pub id: Uuid,
    pub sources: Vec<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Per-source outcome, present once the job completed
    pub results: Option<BTreeMap<String, SourceResultResponse>>,
    pub totals: Option<CrawlStatsResponse>,
    pub error_message: Option<String>,
    pub worker_id: Option<String>,
}

impl From<CrawlJob> for CrawlJobResponse {
    fn from(job: CrawlJob) -> Self {
        let (results, totals) = match job.results {
            Some(report) => (
                Some(
                    report
                        .sources
                        .into_iter()
                        .map(|(key, source)| (key, source.into()))
                        .collect(),
                ),
                Some(report.totals.into()),
            ),
            None => (None, None),
        };

        Self {
            id: job.id,
            sources: job.sources,
            status: job.status.to_string(),
            created_at: job.created_at,
            updated_at: job.updated_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            results,
            totals,
            error_message: job.error_message,
            worker_id: job.worker_id,
        }
    }
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CrawlJobListResponse {
    pub jobs: Vec<CrawlJobResponse>,
    pub total: usize,
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SourceResponse {
    pub key: String,
    pub name: String,
    pub domain: String,
    /// `static` or `rendered`
    pub render_mode: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SourceListResponse {
    pub sources: Vec<SourceResponse>,
}

// ---------------------------------------------------------------------------
// Products and prices
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListProductsQuery {
    pub category: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ProductResponse {
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

impl From<Product> for ProductResponse {
    fn from(p: Product) -> Self {
        Self {
            id: p.id,
            source_id: p.source_id,
            name: p.name,
            url: p.url,
            sku: p.sku,
            brand: p.brand,
            category: p.category,
            description: p.description,
            image_url: p.image_url,
            rating: p.rating,
            review_count: p.review_count,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ProductListResponse {
    pub products: Vec<ProductResponse>,
    pub total: usize,
}

/// Time window for price queries; both bounds inclusive, RFC 3339.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct PriceRangeQuery {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ObservationResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub price: Option<f64>,
    pub currency: String,
    pub in_stock: bool,
    pub observed_at: DateTime<Utc>,
}

impl From<PriceObservation> for ObservationResponse {
    fn from(o: PriceObservation) -> Self {
        Self {
            id: o.id,
            product_id: o.product_id,
            price: o.price,
            currency: o.currency,
            in_stock: o.in_stock,
            observed_at: o.observed_at,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PriceHistoryResponse {
    pub product_id: Uuid,
    pub observations: Vec<ObservationResponse>,
    pub total: usize,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CategoryPricesResponse {
    pub category: String,
    pub observations: Vec<ObservationResponse>,
    pub total: usize,
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CategoryCountResponse {
    /// Null for products stored without a category
    pub category: Option<String>,
    pub product_count: i64,
}

impl From<CategorySummary> for CategoryCountResponse {
    fn from(c: CategorySummary) -> Self {
        Self {
            category: c.category,
            product_count: c.product_count,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CategorySummaryResponse {
    pub categories: Vec<CategoryCountResponse>,
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
