use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Pricewatch API",
        version = "0.1.0",
        description = "Catalog crawl dispatch and product price history."
    ),
    paths(
        crate::routes::create_crawl,
        crate::routes::list_crawls,
        crate::routes::get_crawl,
        crate::routes::cancel_crawl,
        crate::routes::list_sources,
        crate::routes::list_products,
        crate::routes::get_product,
        crate::routes::product_prices,
        crate::routes::list_categories,
        crate::routes::category_prices,
        crate::routes::health,
    ),
    components(schemas(
        crate::dto::CreateCrawlRequest,
        crate::dto::CreateCrawlResponse,
        crate::dto::CrawlJobResponse,
        crate::dto::CrawlJobListResponse,
        crate::dto::SourceResultResponse,
        crate::dto::CrawlStatsResponse,
        crate::dto::SourceResponse,
        crate::dto::SourceListResponse,
        crate::dto::ProductResponse,
        crate::dto::ProductListResponse,
        crate::dto::ObservationResponse,
        crate::dto::PriceHistoryResponse,
        crate::dto::CategoryPricesResponse,
        crate::dto::CategoryCountResponse,
        crate::dto::CategorySummaryResponse,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "crawls", description = "Crawl job dispatch and status"),
        (name = "sources", description = "Crawlable catalog sources"),
        (name = "products", description = "Products and their price history"),
        (name = "categories", description = "Category summaries and prices"),
        (name = "system", description = "Health and system status"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Registers the bearer scheme guarding the crawl endpoints.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("token")
                        .description(Some(
                            "Admin token. Set via PRICEWATCH_ADMIN_TOKEN environment variable.",
                        ))
                        .build(),
                ),
            );
        }
    }
}
