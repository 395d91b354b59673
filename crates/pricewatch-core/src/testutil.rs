//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests. All mocks use
//! `Arc<Mutex<_>>` for interior mutability so tests can assert on recorded
//! calls.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::adapter::{EntryPoint, ExtractedPage, PageContext, RenderMode, SourceAdapter};
use crate::error::AppError;
use crate::job::{CrawlJob, JobStatus};
use crate::job_queue::JobQueue;
use crate::models::{CandidateRecord, MergeOutcome, ProductRecord, SourceInfo};
use crate::runner::{CrawlEvent, CrawlReport, CrawlReporter};
use crate::traits::{Fetcher, FetcherFactory, ObservationStore};
use crate::worker::{WorkerEvent, WorkerReporter};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum MockResponse {
    Page(String),
    Failure(String),
}

/// Mock fetcher serving pages from a URL map.
///
/// Unknown URLs answer with an HTTP 404 error unless a default page is set.
#[derive(Clone, Default)]
pub struct MockFetcher {
    pages: Arc<Mutex<HashMap<String, MockResponse>>>,
    default_page: Option<String>,
    latency: Duration,
    calls: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every URL with `body`.
    pub fn with_default(body: &str) -> Self {
        Self {
            default_page: Some(body.to_string()),
            ..Self::default()
        }
    }

    pub fn with_page(self, url: &str, body: &str) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), MockResponse::Page(body.to_string()));
        self
    }

    /// Make `url` fail with a network error.
    pub fn with_failure(self, url: &str, message: &str) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), MockResponse::Failure(message.to_string()));
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// URLs fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of fetches observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.calls.lock().unwrap().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let response = self.pages.lock().unwrap().get(url).cloned();
        match (response, &self.default_page) {
            (Some(MockResponse::Page(body)), _) => Ok(body),
            (Some(MockResponse::Failure(message)), _) => Err(AppError::NetworkError(message)),
            (None, Some(body)) => Ok(body.clone()),
            (None, None) => Err(AppError::HttpError(format!("HTTP 404 Not Found for {url}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// MockFetcherFactory
// ---------------------------------------------------------------------------

/// Factory handing out clones of one MockFetcher.
#[derive(Clone)]
pub struct MockFetcherFactory {
    fetcher: MockFetcher,
    rendered_error: Option<String>,
}

impl MockFetcherFactory {
    pub fn new(fetcher: MockFetcher) -> Self {
        Self {
            fetcher,
            rendered_error: None,
        }
    }

    /// Fail to create engines for rendered sources (e.g. no browser).
    pub fn failing_rendered(mut self, message: &str) -> Self {
        self.rendered_error = Some(message.to_string());
        self
    }
}

impl FetcherFactory for MockFetcherFactory {
    type Fetcher = MockFetcher;

    async fn create(&self, mode: &RenderMode) -> Result<MockFetcher, AppError> {
        match (&self.rendered_error, mode.is_rendered()) {
            (Some(message), true) => Err(AppError::RenderError(message.clone())),
            _ => Ok(self.fetcher.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    sources: HashMap<String, Uuid>,
    products: HashMap<(Uuid, String), Uuid>,
    observations: Vec<(Uuid, Option<f64>)>,
    failing_skus: HashSet<String>,
}

/// In-memory store with get-or-create semantics.
#[derive(Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<StoreState>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every merge of a record with this sku.
    pub fn failing_sku(self, sku: &str) -> Self {
        self.state.lock().unwrap().failing_skus.insert(sku.to_string());
        self
    }

    pub fn source_count(&self) -> usize {
        self.state.lock().unwrap().sources.len()
    }

    pub fn product_count(&self) -> usize {
        self.state.lock().unwrap().products.len()
    }

    pub fn observation_count(&self) -> usize {
        self.state.lock().unwrap().observations.len()
    }
}

impl ObservationStore for MockStore {
    async fn merge(&self, record: &ProductRecord) -> Result<MergeOutcome, AppError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_skus.contains(&record.sku) {
            return Err(AppError::DatabaseError(format!(
                "duplicate key value violates unique constraint for {}",
                record.sku
            )));
        }

        let source_id = *state
            .sources
            .entry(record.source_domain.clone())
            .or_insert_with(Uuid::new_v4);
        let key = (source_id, record.sku.clone());
        let product_created = !state.products.contains_key(&key);
        let product_id = *state.products.entry(key).or_insert_with(Uuid::new_v4);
        state.observations.push((product_id, record.price));

        Ok(MergeOutcome {
            source_id,
            product_id,
            observation_id: Uuid::new_v4(),
            product_created,
        })
    }
}

// ---------------------------------------------------------------------------
// MockJobQueue
// ---------------------------------------------------------------------------

/// Mock job queue backed by an in-memory Vec.
#[derive(Clone, Default)]
pub struct MockJobQueue {
    jobs: Arc<Mutex<Vec<CrawlJob>>>,
    claim_error: Arc<Mutex<Option<AppError>>>,
    released_workers: Arc<Mutex<Vec<String>>>,
}

impl MockJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next claim fails with `error`.
    pub fn with_claim_error(self, error: AppError) -> Self {
        *self.claim_error.lock().unwrap() = Some(error);
        self
    }

    pub fn released_workers(&self) -> Vec<String> {
        self.released_workers.lock().unwrap().clone()
    }
}

impl JobQueue for MockJobQueue {
    async fn create_job(&self, sources: &[String]) -> Result<CrawlJob, AppError> {
        let now = Utc::now();
        let job = CrawlJob {
            id: Uuid::new_v4(),
            sources: sources.to_vec(),
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            results: None,
            error_message: None,
            worker_id: None,
        };
        self.jobs.lock().unwrap().push(job.clone());
        Ok(job)
    }

    async fn claim_job(&self, worker_id: &str) -> Result<Option<CrawlJob>, AppError> {
        if let Some(e) = self.claim_error.lock().unwrap().take() {
            return Err(e);
        }

        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs.iter_mut().find(|j| j.status == JobStatus::Pending) else {
            return Ok(None);
        };
        job.status = JobStatus::Running;
        job.worker_id = Some(worker_id.to_string());
        job.started_at = Some(Utc::now());
        Ok(Some(job.clone()))
    }

    async fn complete_job(&self, job_id: Uuid, report: &CrawlReport) -> Result<(), AppError> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs
            .iter_mut()
            .find(|j| j.id == job_id && j.status == JobStatus::Running)
        {
            job.status = JobStatus::Completed;
            job.results = Some(report.clone());
            job.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn fail_job(&self, job_id: Uuid, error: &str) -> Result<(), AppError> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            job.status = JobStatus::Failed;
            job.error_message = Some(error.to_string());
            job.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn cancel_job(&self, job_id: Uuid) -> Result<bool, AppError> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs
            .iter_mut()
            .find(|j| j.id == job_id && !j.status.is_terminal())
        {
            Some(job) => {
                job.status = JobStatus::Cancelled;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<CrawlJob>, AppError> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs.iter().find(|j| j.id == job_id).cloned())
    }

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<CrawlJob>, AppError> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .iter()
            .rev()
            .filter(|j| status.is_none_or(|s| j.status == s))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn release_worker_jobs(&self, worker_id: &str) -> Result<u64, AppError> {
        self.released_workers
            .lock()
            .unwrap()
            .push(worker_id.to_string());

        let mut jobs = self.jobs.lock().unwrap();
        let mut count = 0u64;
        for job in jobs.iter_mut() {
            if job.worker_id.as_deref() == Some(worker_id) && job.status == JobStatus::Running {
                job.status = JobStatus::Pending;
                job.worker_id = None;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64, AppError> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs.iter().filter(|j| j.status == status).count() as i64)
    }
}

// ---------------------------------------------------------------------------
// Reporters
// ---------------------------------------------------------------------------

/// Crawl reporter that records event names.
#[derive(Default)]
pub struct MockReporter {
    events: Mutex<Vec<String>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl CrawlReporter for MockReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        let label = match event {
            CrawlEvent::RunStarted { .. } => "RunStarted",
            CrawlEvent::SourceStarted { .. } => "SourceStarted",
            CrawlEvent::RecordRejected { .. } => "RecordRejected",
            CrawlEvent::PersistenceFailed { .. } => "PersistenceFailed",
            CrawlEvent::SourceFinished { .. } => "SourceFinished",
            CrawlEvent::RunFinished { .. } => "RunFinished",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}

/// Worker reporter that records event names.
#[derive(Default)]
pub struct MockWorkerReporter {
    events: Mutex<Vec<String>>,
}

impl MockWorkerReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl WorkerReporter for MockWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        let label = match event {
            WorkerEvent::Started { .. } => "Started",
            WorkerEvent::Polling => "Polling",
            WorkerEvent::JobClaimed { .. } => "JobClaimed",
            WorkerEvent::JobCompleted { .. } => "JobCompleted",
            WorkerEvent::JobCancelled { .. } => "JobCancelled",
            WorkerEvent::JobFailed { .. } => "JobFailed",
            WorkerEvent::ShuttingDown { .. } => "ShuttingDown",
            WorkerEvent::Stopped { .. } => "Stopped",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}

// ---------------------------------------------------------------------------
// ScriptedAdapter
// ---------------------------------------------------------------------------

const TEST_SHOP: SourceInfo = SourceInfo {
    name: "Test Shop",
    domain: "shop.test",
};

/// Adapter over a line-based page format, see [`catalog_page`].
///
/// - `item:<sku>` emits a valid record
/// - `bad:<sku>` emits a record with a negative price
/// - `skip` counts a card dropped at extraction
/// - `next:<url>` sets the next-page locator
pub struct ScriptedAdapter {
    key: &'static str,
    entries: Vec<EntryPoint>,
    mode: RenderMode,
    panics: bool,
}

impl ScriptedAdapter {
    pub fn new(key: &'static str) -> Self {
        Self {
            key,
            entries: Vec::new(),
            mode: RenderMode::Static,
            panics: false,
        }
    }

    pub fn with_entry(mut self, url: &str, category: Option<&str>) -> Self {
        let mut entry = EntryPoint::new(url);
        entry.category = category.map(str::to_string);
        self.entries.push(entry);
        self
    }

    pub fn with_mode(mut self, mode: RenderMode) -> Self {
        self.mode = mode;
        self
    }

    /// Panic on every extraction.
    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    fn record(sku: &str, price: f64, context: &PageContext<'_>) -> CandidateRecord {
        CandidateRecord {
            name: Some(format!("Item {sku}")),
            url: Some(format!("https://shop.test/item/{sku}")),
            sku: Some(sku.to_string()),
            price: Some(price),
            currency: Some("USD".into()),
            in_stock: Some(true),
            category: context.category.map(str::to_string),
            ..CandidateRecord::for_source(TEST_SHOP)
        }
    }
}

impl SourceAdapter for ScriptedAdapter {
    fn key(&self) -> &'static str {
        self.key
    }

    fn source(&self) -> SourceInfo {
        TEST_SHOP
    }

    fn render_mode(&self) -> RenderMode {
        self.mode.clone()
    }

    fn start_points(&self) -> Vec<EntryPoint> {
        self.entries.clone()
    }

    fn extract_page(&self, content: &str, context: &PageContext<'_>) -> ExtractedPage {
        if self.panics {
            panic!("extraction blew up on {}", context.url);
        }

        let mut page = ExtractedPage::default();
        for line in content.lines().map(str::trim) {
            if let Some(sku) = line.strip_prefix("item:") {
                page.records.push(Self::record(sku, 10.0, context));
            } else if let Some(sku) = line.strip_prefix("bad:") {
                page.records.push(Self::record(sku, -1.0, context));
            } else if let Some(url) = line.strip_prefix("next:") {
                page.next_page = Some(url.to_string());
            } else if line == "skip" {
                page.skipped += 1;
            }
        }
        page
    }
}

/// Render a page in the [`ScriptedAdapter`] format.
pub fn catalog_page(skus: &[&str], next: Option<&str>) -> String {
    let mut page: Vec<String> = skus.iter().map(|sku| format!("item:{sku}")).collect();
    if let Some(next) = next {
        page.push(format!("next:{next}"));
    }
    page.join("\n")
}
