use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use pricewatch_core::error::AppError;
use pricewatch_core::job::JobStatus;
use pricewatch_core::job_queue::JobQueue;

use crate::auth::require_admin_token;
use crate::dto::{
    CategoryCountResponse, CategoryPricesResponse, CategorySummaryResponse, CrawlJobListResponse,
    CrawlJobResponse, CreateCrawlRequest, CreateCrawlResponse, HealthResponse, ListJobsQuery,
    ListProductsQuery, ObservationResponse, PriceHistoryResponse, PriceRangeQuery,
    ProductListResponse, ProductResponse, SourceListResponse, SourceResponse,
};
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Build the full router with all routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let crawls = Router::new()
        .route("/v1/crawls", post(create_crawl).get(list_crawls))
        .route("/v1/crawls/{id}", get(get_crawl).delete(cancel_crawl))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin_token,
        ));

    let public = Router::new()
        .route("/health", get(health))
        .route("/v1/sources", get(list_sources))
        .route("/v1/products", get(list_products))
        .route("/v1/products/{id}", get(get_product))
        .route("/v1/products/{id}/prices", get(product_prices))
        .route("/v1/categories", get(list_categories))
        .route("/v1/categories/{category}/prices", get(category_prices))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    public.merge(crawls).with_state(state)
}

// ---------------------------------------------------------------------------
// Crawl jobs
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/v1/crawls",
    request_body = CreateCrawlRequest,
    responses(
        (status = 202, description = "Crawl queued", body = CreateCrawlResponse),
        (status = 400, description = "No or unknown sources", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Crawl endpoints disabled"),
    ),
    security(("bearer" = [])),
    tag = "crawls"
)]
pub async fn create_crawl(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<CreateCrawlRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.sources.is_empty() {
        return Err(ApiError::BadRequest(
            "at least one source is required".to_string(),
        ));
    }

    let unknown = state.registry.unknown(&body.sources);
    if !unknown.is_empty() {
        return Err(AppError::UnknownSource(unknown.join(", ")).into());
    }

    let job = state.db.job_repo().create_job(&body.sources).await?;
    tracing::info!(job_id = %job.id, sources = ?job.sources, "Crawl job queued");

    let response = CreateCrawlResponse {
        job_id: job.id,
        status: job.status.to_string(),
    };

    Ok((StatusCode::ACCEPTED, axum::Json(response)))
}

#[utoipa::path(
    get,
    path = "/v1/crawls",
    params(ListJobsQuery),
    responses(
        (status = 200, description = "Crawl jobs, newest first", body = CrawlJobListResponse),
        (status = 400, description = "Unknown status", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "crawls"
)]
pub async fn list_crawls(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListJobsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status_filter = query
        .status
        .map(|s| s.parse::<JobStatus>().map_err(ApiError::BadRequest))
        .transpose()?;

    let limit = query.limit.unwrap_or(20).min(100);
    let jobs = state.db.job_repo().list_jobs(status_filter, limit).await?;
    let total = jobs.len();

    let response = CrawlJobListResponse {
        jobs: jobs.into_iter().map(CrawlJobResponse::from).collect(),
        total,
    };

    Ok(axum::Json(response))
}

#[utoipa::path(
    get,
    path = "/v1/crawls/{id}",
    params(
        ("id" = Uuid, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job status and per-source results", body = CrawlJobResponse),
        (status = 404, description = "Not found", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "crawls"
)]
pub async fn get_crawl(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .db
        .job_repo()
        .get_job(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Job not found: {id}")))?;

    Ok(axum::Json(CrawlJobResponse::from(job)))
}

#[utoipa::path(
    delete,
    path = "/v1/crawls/{id}",
    params(
        ("id" = Uuid, Path, description = "Job ID")
    ),
    responses(
        (status = 204, description = "Job cancelled"),
        (status = 404, description = "Not found", body = crate::dto::ErrorResponse),
        (status = 409, description = "Job already finished", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "crawls"
)]
pub async fn cancel_crawl(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = state.db.job_repo();
    let job = repo
        .get_job(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Job not found: {id}")))?;

    if job.status.is_terminal() || !repo.cancel_job(id).await? {
        return Err(ApiError::Conflict(format!(
            "Job {id} is already in terminal state: {}",
            job.status
        )));
    }

    tracing::info!(job_id = %id, "Crawl job cancelled");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/sources",
    responses(
        (status = 200, description = "Crawlable sources", body = SourceListResponse),
    ),
    tag = "sources"
)]
pub async fn list_sources(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let sources = state
        .registry
        .keys()
        .into_iter()
        .filter_map(|key| state.registry.get(key).map(|adapter| (key, adapter)))
        .map(|(key, adapter)| {
            let info = adapter.source();
            SourceResponse {
                key: key.to_string(),
                name: info.name.to_string(),
                domain: info.domain.to_string(),
                render_mode: if adapter.render_mode().is_rendered() {
                    "rendered"
                } else {
                    "static"
                }
                .to_string(),
            }
        })
        .collect();

    axum::Json(SourceListResponse { sources })
}

// ---------------------------------------------------------------------------
// Products and prices
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/products",
    params(ListProductsQuery),
    responses(
        (status = 200, description = "Products ordered by name", body = ProductListResponse),
    ),
    tag = "products"
)]
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListProductsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let products = state
        .db
        .price_repo()
        .list_products(
            query.category.as_deref(),
            clamp_limit(query.limit),
            query.offset.unwrap_or(0),
        )
        .await?;
    let total = products.len();

    Ok(axum::Json(ProductListResponse {
        products: products.into_iter().map(ProductResponse::from).collect(),
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Product details", body = ProductResponse),
        (status = 404, description = "Not found", body = crate::dto::ErrorResponse),
    ),
    tag = "products"
)]
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state
        .db
        .price_repo()
        .get_product(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product not found: {id}")))?;

    Ok(axum::Json(ProductResponse::from(product)))
}

#[utoipa::path(
    get,
    path = "/v1/products/{id}/prices",
    params(
        ("id" = Uuid, Path, description = "Product ID"),
        PriceRangeQuery,
    ),
    responses(
        (
            status = 200,
            description = "Price observations, newest first",
            body = PriceHistoryResponse
        ),
        (status = 404, description = "Not found", body = crate::dto::ErrorResponse),
    ),
    tag = "products"
)]
pub async fn product_prices(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<PriceRangeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = state.db.price_repo();
    if repo.get_product(id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Product not found: {id}")));
    }

    let observations = repo
        .price_history(id, query.since, query.until, clamp_limit(query.limit))
        .await?;
    let total = observations.len();

    Ok(axum::Json(PriceHistoryResponse {
        product_id: id,
        observations: observations
            .into_iter()
            .map(ObservationResponse::from)
            .collect(),
        total,
    }))
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/categories",
    responses(
        (status = 200, description = "Product count per category", body = CategorySummaryResponse),
    ),
    tag = "categories"
)]
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state.db.price_repo().category_summary().await?;

    Ok(axum::Json(CategorySummaryResponse {
        categories: summary
            .into_iter()
            .map(CategoryCountResponse::from)
            .collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/v1/categories/{category}/prices",
    params(
        ("category" = String, Path, description = "Category label"),
        PriceRangeQuery,
    ),
    responses(
        (
            status = 200,
            description = "Observations in the category, newest first",
            body = CategoryPricesResponse
        ),
    ),
    tag = "categories"
)]
pub async fn category_prices(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
    Query(query): Query<PriceRangeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let observations = state
        .db
        .price_repo()
        .observations_by_category(&category, query.since, query.until, clamp_limit(query.limit))
        .await?;
    let total = observations.len();

    Ok(axum::Json(CategoryPricesResponse {
        category,
        observations: observations
            .into_iter()
            .map(ObservationResponse::from)
            .collect(),
        total,
    }))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let healthy = state.db.price_repo().health_check().await.is_ok();

    let (status, response) = if healthy {
        (
            StatusCode::OK,
            HealthResponse {
                status: "healthy",
                database: "ok",
            },
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            HealthResponse {
                status: "unhealthy",
                database: "error",
            },
        )
    };

    (status, axum::Json(response))
}
