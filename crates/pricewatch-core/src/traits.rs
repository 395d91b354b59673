use std::future::Future;

use uuid::Uuid;

use crate::adapter::RenderMode;
use crate::error::AppError;
use crate::models::{MergeOutcome, ProductRecord};

/// Fetches the content of one catalog page.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Builds a fetch engine suited to a source's render mode.
///
/// The runner asks for one fetcher per source, so a rendered source gets
/// its own browser session while static sources share plain HTTP clients.
pub trait FetcherFactory: Send + Sync + Clone {
    type Fetcher: Fetcher + 'static;

    fn create(
        &self,
        mode: &RenderMode,
    ) -> impl Future<Output = Result<Self::Fetcher, AppError>> + Send;
}

/// Merges validated records into the dimensional store.
pub trait ObservationStore: Send + Sync + Clone {
    /// Get-or-create the source and product, then append one observation.
    /// Runs as a single atomic unit.
    fn merge(
        &self,
        record: &ProductRecord,
    ) -> impl Future<Output = Result<MergeOutcome, AppError>> + Send;
}

/// A no-op ObservationStore for dry runs.
#[derive(Debug, Clone)]
pub struct NullStore;

impl ObservationStore for NullStore {
    async fn merge(&self, _record: &ProductRecord) -> Result<MergeOutcome, AppError> {
        Ok(MergeOutcome {
            source_id: Uuid::nil(),
            product_id: Uuid::nil(),
            observation_id: Uuid::nil(),
            product_created: false,
        })
    }
}
