pub mod adapter;
pub mod cache;
pub mod error;
pub mod identity;
pub mod job;
pub mod job_queue;
pub mod models;
pub mod render;
pub mod runner;
pub mod scheduler;
pub mod throttle;
pub mod traits;
pub mod validate;
pub mod worker;

#[cfg(test)]
pub mod testutil;

pub use adapter::{
    EntryPoint, ExtractedPage, PageContext, RenderMode, SourceAdapter, SourceRegistry,
};
pub use error::AppError;
pub use models::{CandidateRecord, ProductRecord, SourceInfo, compute_hash};
pub use runner::{CrawlReport, CrawlRunner, SourceStatus};
pub use scheduler::SchedulerConfig;
pub use traits::{Fetcher, FetcherFactory, ObservationStore};
