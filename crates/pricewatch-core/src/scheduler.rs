//! Fetch scheduling: bounded concurrency and sequential pagination chains.
//!
//! Every entry point of a source is one *branch*. Branches of a source run
//! concurrently; within a branch page N+1 is fetched only after page N has
//! been extracted and yielded its next locator. A shared semaphore caps the
//! number of in-flight requests across every source of a run; a request
//! waits for its per-host slot first and only then takes a permit, so one
//! host's politeness delay never holds budget other hosts could use.
//!
//! Extracted pages are handed to the consumer stage through an mpsc
//! channel, so one branch's pages arrive in page order while branches
//! interleave freely.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

use crate::adapter::{EntryPoint, PageContext, RenderMode, SourceAdapter};
use crate::cache::CacheConfig;
use crate::error::AppError;
use crate::models::CandidateRecord;
use crate::throttle::{HostThrottle, ThrottleConfig};
use crate::traits::Fetcher;

/// Crawl-wide scheduling settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum simultaneously in-flight requests across a run.
    pub max_concurrency: usize,
    /// Per-host delay for static sources.
    pub static_delay: Duration,
    /// Per-host delay for rendered sources.
    pub rendered_delay: Duration,
    /// Upper bound on waiting for a rendered page's ready signal.
    pub render_wait: Duration,
    /// Per-request fetch timeout.
    pub request_timeout: Duration,
    /// Random jitter added to the per-host delay.
    pub jitter: Duration,
    /// Optional on-disk response cache.
    pub cache: Option<CacheConfig>,
    /// Stop each branch after this many pages.
    pub max_pages: Option<u32>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 16,
            static_delay: Duration::from_millis(250),
            rendered_delay: Duration::from_secs(1),
            render_wait: Duration::from_secs(12),
            request_timeout: Duration::from_secs(30),
            jitter: Duration::ZERO,
            cache: None,
            max_pages: None,
        }
    }
}

impl SchedulerConfig {
    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }

    pub fn with_static_delay(mut self, delay: Duration) -> Self {
        self.static_delay = delay;
        self
    }

    pub fn with_rendered_delay(mut self, delay: Duration) -> Self {
        self.rendered_delay = delay;
        self
    }

    pub fn with_render_wait(mut self, wait: Duration) -> Self {
        self.render_wait = wait;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_max_pages(mut self, pages: u32) -> Self {
        self.max_pages = Some(pages);
        self
    }

    /// Per-host throttle for a source's render mode.
    pub fn throttle_for(&self, mode: &RenderMode) -> ThrottleConfig {
        let delay = if mode.is_rendered() {
            self.rendered_delay
        } else {
            self.static_delay
        };
        ThrottleConfig::new(delay).with_jitter(self.jitter)
    }
}

/// One extracted page, handed from a branch to the consumer stage.
#[derive(Debug, Clone)]
pub struct PageBatch {
    pub category: Option<String>,
    pub page_url: String,
    pub page_number: u32,
    pub fetched_at: DateTime<Utc>,
    pub records: Vec<CandidateRecord>,
    pub skipped: usize,
}

/// How one pagination branch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchOutcome {
    pub entry_url: String,
    pub category: Option<String>,
    pub pages_fetched: u32,
    /// Fetch failure that halted the branch.
    pub error: Option<String>,
    pub cancelled: bool,
}

impl BranchOutcome {
    fn new(entry: &EntryPoint) -> Self {
        Self {
            entry_url: entry.url.clone(),
            category: entry.category.clone(),
            pages_fetched: 0,
            error: None,
            cancelled: false,
        }
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Branch outcomes of one source crawl.
#[derive(Debug, Clone, Default)]
pub struct CrawlOutcome {
    pub branches: Vec<BranchOutcome>,
}

impl CrawlOutcome {
    pub fn pages_fetched(&self) -> u32 {
        self.branches.iter().map(|b| b.pages_fetched).sum()
    }

    pub fn branches_failed(&self) -> usize {
        self.branches.iter().filter(|b| b.failed()).count()
    }

    pub fn cancelled(&self) -> bool {
        self.branches.iter().any(|b| b.cancelled)
    }

    /// True when every branch failed without fetching a single page.
    pub fn all_failed(&self) -> bool {
        !self.branches.is_empty()
            && self.pages_fetched() == 0
            && self.branches.iter().all(BranchOutcome::failed)
    }
}

/// Drives an adapter's pagination branches over a fetcher.
pub struct FetchScheduler<F: Fetcher> {
    fetcher: F,
    permits: Arc<Semaphore>,
    throttle: Option<(HostThrottle, ThrottleConfig)>,
    max_pages: Option<u32>,
}

impl<F: Fetcher> FetchScheduler<F> {
    /// `permits` is the run-wide in-flight budget; share it between the
    /// schedulers of concurrently crawled sources.
    pub fn new(fetcher: F, permits: Arc<Semaphore>) -> Self {
        Self {
            fetcher,
            permits,
            throttle: None,
            max_pages: None,
        }
    }

    /// Space requests per host through `hosts`, which may be shared with
    /// the schedulers of other sources.
    pub fn with_throttle(mut self, hosts: HostThrottle, config: ThrottleConfig) -> Self {
        self.throttle = Some((hosts, config));
        self
    }

    pub fn with_max_pages(mut self, max_pages: Option<u32>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Crawl every start point of `adapter`, sending pages to `pages`.
    ///
    /// Returns once every branch has ended. A failing branch never affects
    /// its siblings.
    pub async fn crawl(
        &self,
        adapter: &dyn SourceAdapter,
        pages: mpsc::Sender<PageBatch>,
        cancel: &CancellationToken,
    ) -> CrawlOutcome {
        let branches = adapter
            .start_points()
            .into_iter()
            .map(|entry| self.run_branch(adapter, entry, pages.clone(), cancel));
        let branches = join_all(branches).await;
        CrawlOutcome { branches }
    }

    async fn run_branch(
        &self,
        adapter: &dyn SourceAdapter,
        entry: EntryPoint,
        pages: mpsc::Sender<PageBatch>,
        cancel: &CancellationToken,
    ) -> BranchOutcome {
        let source = adapter.key();
        let mut outcome = BranchOutcome::new(&entry);
        let mut visited = HashSet::new();
        let mut next = Some(entry.url.clone());

        while let Some(url) = next.take() {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            if self.max_pages.is_some_and(|max| outcome.pages_fetched >= max) {
                tracing::debug!(%source, %url, "Page cap reached, ending branch");
                break;
            }
            if !visited.insert(url.clone()) {
                tracing::warn!(%source, %url, "Pagination loops back to a visited page");
                break;
            }

            let page_number = outcome.pages_fetched + 1;
            let content = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    outcome.cancelled = true;
                    break;
                }
                result = self.fetch_page(&url) => result,
            };
            let content = match content {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(
                        %source,
                        %url,
                        page_number,
                        error = %e,
                        "Fetch failed, halting branch"
                    );
                    outcome.error = Some(e.to_string());
                    break;
                }
            };
            let fetched_at = Utc::now();
            outcome.pages_fetched = page_number;

            let context = PageContext {
                url: &url,
                category: entry.category.as_deref(),
                page_number,
            };
            let page = adapter.extract_page(&content, &context);
            tracing::debug!(
                %source,
                %url,
                page_number,
                records = page.records.len(),
                skipped = page.skipped,
                has_next = page.next_page.is_some(),
                "Page extracted"
            );
            next = page.next_page;

            let batch = PageBatch {
                category: entry.category.clone(),
                page_url: url,
                page_number,
                fetched_at,
                records: page.records,
                skipped: page.skipped,
            };
            if pages.send(batch).await.is_err() {
                tracing::debug!(%source, "Consumer closed, ending branch");
                break;
            }
        }

        outcome
    }

    /// Wait for the host's slot, then fetch one page while holding an
    /// in-flight permit.
    async fn fetch_page(&self, url: &str) -> Result<String, AppError> {
        if let Some((hosts, config)) = &self.throttle {
            hosts.wait(url, config).await;
        }
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AppError::Cancelled)?;
        self.fetcher.fetch(url).await
    }
}
