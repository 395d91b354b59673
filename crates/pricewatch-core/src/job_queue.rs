use std::future::Future;

use uuid::Uuid;

use crate::error::AppError;
use crate::job::{CrawlJob, JobStatus};
use crate::runner::CrawlReport;

/// Persistent queue of crawl jobs.
///
/// Implementations must claim atomically (`SELECT FOR UPDATE SKIP LOCKED`
/// or equivalent) so that no two workers run the same job.
pub trait JobQueue: Send + Sync + Clone {
    fn create_job(
        &self,
        sources: &[String],
    ) -> impl Future<Output = Result<CrawlJob, AppError>> + Send;

    /// Atomically claim the oldest pending job. `None` if the queue is empty.
    fn claim_job(
        &self,
        worker_id: &str,
    ) -> impl Future<Output = Result<Option<CrawlJob>, AppError>> + Send;

    /// Record the run's per-source results and mark the job completed.
    fn complete_job(
        &self,
        job_id: Uuid,
        report: &CrawlReport,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn fail_job(
        &self,
        job_id: Uuid,
        error: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Cancel a pending or running job. Returns false when the job does not
    /// exist or is already terminal.
    fn cancel_job(&self, job_id: Uuid) -> impl Future<Output = Result<bool, AppError>> + Send;

    fn get_job(
        &self,
        job_id: Uuid,
    ) -> impl Future<Output = Result<Option<CrawlJob>, AppError>> + Send;

    /// Jobs newest first, optionally filtered by status.
    fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<CrawlJob>, AppError>> + Send;

    /// Return every running job held by `worker_id` to `pending`.
    fn release_worker_jobs(
        &self,
        worker_id: &str,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    fn count_by_status(
        &self,
        status: JobStatus,
    ) -> impl Future<Output = Result<i64, AppError>> + Send;
}
