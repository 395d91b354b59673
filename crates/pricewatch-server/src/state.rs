use pricewatch_core::SourceRegistry;
use pricewatch_db::Database;

/// Shared application state, available to all route handlers via `State<Arc<AppState>>`.
pub struct AppState {
    pub db: Database,
    /// Bearer token guarding the crawl endpoints (None = those endpoints are disabled).
    pub admin_token: Option<String>,
    /// Sources a crawl job may name.
    pub registry: SourceRegistry,
}
