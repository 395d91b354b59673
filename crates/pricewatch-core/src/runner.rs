//! Crawl orchestration: adapters through scheduler, validator and merger.
//!
//! Each requested source runs in its own task. A source's failure (unknown
//! key, engine that cannot start, panic, cancellation) is recorded in the
//! report and never affects its siblings.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::adapter::{SourceAdapter, SourceRegistry};
use crate::cache::CachedFetcher;
use crate::error::AppError;
use crate::scheduler::{CrawlOutcome, FetchScheduler, PageBatch, SchedulerConfig};
use crate::throttle::HostThrottle;
use crate::traits::{FetcherFactory, ObservationStore};
use crate::validate::{RecordValidator, Rejection};

/// Pages buffered between a source's branches and its consumer.
const PAGE_BUFFER: usize = 32;

/// Events emitted while a crawl runs.
#[derive(Debug, Clone)]
pub enum CrawlEvent<'a> {
    RunStarted {
        sources: &'a [String],
    },
    SourceStarted {
        source: &'a str,
    },
    RecordRejected {
        source: &'a str,
        rejection: &'a Rejection,
    },
    PersistenceFailed {
        source: &'a str,
        sku: &'a str,
        url: &'a str,
        error: &'a str,
    },
    SourceFinished {
        source: &'a str,
        report: &'a SourceReport,
    },
    RunFinished {
        report: &'a CrawlReport,
    },
}

/// Receives crawl events (decoupled logging).
pub trait CrawlReporter: Send + Sync {
    fn report(&self, event: CrawlEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCrawlReporter;

impl CrawlReporter for TracingCrawlReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        match event {
            CrawlEvent::RunStarted { sources } => {
                tracing::info!(?sources, "Crawl started");
            }
            CrawlEvent::SourceStarted { source } => {
                tracing::info!(%source, "Source crawl started");
            }
            CrawlEvent::RecordRejected { source, rejection } => {
                tracing::warn!(
                    %source,
                    sku = ?rejection.sku,
                    url = ?rejection.url,
                    reasons = %rejection,
                    "Record rejected"
                );
            }
            CrawlEvent::PersistenceFailed {
                source,
                sku,
                url,
                error,
            } => {
                tracing::warn!(%source, %sku, %url, %error, "Record not persisted, rolled back");
            }
            CrawlEvent::SourceFinished { source, report } => match report.status {
                SourceStatus::Success => tracing::info!(
                    %source,
                    pages = report.stats.pages_fetched,
                    saved = report.stats.observations_saved,
                    rejected = report.stats.records_rejected,
                    "Source crawl succeeded"
                ),
                SourceStatus::Failed => tracing::warn!(
                    %source,
                    error = ?report.error,
                    pages = report.stats.pages_fetched,
                    "Source crawl failed"
                ),
            },
            CrawlEvent::RunFinished { report } => {
                tracing::info!(
                    succeeded = report.succeeded().len(),
                    failed = report.failed().len(),
                    saved = report.totals.observations_saved,
                    "Crawl finished"
                );
            }
        }
    }
}

/// Final status of one source in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Success,
    Failed,
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceStatus::Success => "success",
            SourceStatus::Failed => "failed",
        })
    }
}

/// Counters for one source (or, summed, for a run).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStats {
    pub pages_fetched: u64,
    pub branches_failed: u64,
    pub records_extracted: u64,
    /// Cards dropped at extraction for lacking a name or link.
    pub records_skipped: u64,
    pub records_rejected: u64,
    pub observations_saved: u64,
    pub persistence_failures: u64,
}

impl SourceStats {
    fn add(&mut self, other: &SourceStats) {
        self.pages_fetched += other.pages_fetched;
        self.branches_failed += other.branches_failed;
        self.records_extracted += other.records_extracted;
        self.records_skipped += other.records_skipped;
        self.records_rejected += other.records_rejected;
        self.observations_saved += other.observations_saved;
        self.persistence_failures += other.persistence_failures;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    pub status: SourceStatus,
    pub stats: SourceStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceReport {
    fn failed(stats: SourceStats, error: impl Into<String>) -> Self {
        Self {
            status: SourceStatus::Failed,
            stats,
            error: Some(error.into()),
        }
    }
}

/// Outcome of a crawl run: one entry per requested source plus totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlReport {
    pub sources: BTreeMap<String, SourceReport>,
    pub totals: SourceStats,
}

impl CrawlReport {
    fn insert(&mut self, source: String, report: SourceReport) {
        self.totals.add(&report.stats);
        self.sources.insert(source, report);
    }

    pub fn status_of(&self, source: &str) -> Option<SourceStatus> {
        self.sources.get(source).map(|r| r.status)
    }

    /// Per-source success/failed map.
    pub fn status_map(&self) -> BTreeMap<String, SourceStatus> {
        self.sources
            .iter()
            .map(|(k, r)| (k.clone(), r.status))
            .collect()
    }

    pub fn succeeded(&self) -> Vec<&str> {
        self.keys_with(SourceStatus::Success)
    }

    pub fn failed(&self) -> Vec<&str> {
        self.keys_with(SourceStatus::Failed)
    }

    fn keys_with(&self, status: SourceStatus) -> Vec<&str> {
        self.sources
            .iter()
            .filter(|(_, r)| r.status == status)
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

/// Runs crawls for sets of sources.
#[derive(Clone)]
pub struct CrawlRunner<FF, S>
where
    FF: FetcherFactory,
    S: ObservationStore,
{
    factory: FF,
    store: S,
    registry: SourceRegistry,
    config: SchedulerConfig,
}

impl<FF, S> CrawlRunner<FF, S>
where
    FF: FetcherFactory + 'static,
    S: ObservationStore + 'static,
{
    pub fn new(factory: FF, store: S, registry: SourceRegistry, config: SchedulerConfig) -> Self {
        Self {
            factory,
            store,
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Crawl `sources` to completion and report per-source status.
    ///
    /// Duplicate keys are crawled once. The in-flight request budget and
    /// the per-host request spacing are shared by every source of the run.
    pub async fn run<R>(
        &self,
        sources: &[String],
        cancel: &CancellationToken,
        reporter: Arc<R>,
    ) -> CrawlReport
    where
        R: CrawlReporter + 'static,
    {
        reporter.report(CrawlEvent::RunStarted { sources });

        let permits = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let hosts = HostThrottle::new();
        let mut report = CrawlReport::default();
        let mut tasks = JoinSet::new();
        let mut pending: Vec<String> = Vec::new();

        for key in sources {
            if pending.contains(key) || report.sources.contains_key(key) {
                continue;
            }
            let Some(adapter) = self.registry.get(key) else {
                let failed = SourceReport::failed(
                    SourceStats::default(),
                    AppError::UnknownSource(key.clone()).to_string(),
                );
                reporter.report(CrawlEvent::SourceFinished {
                    source: key,
                    report: &failed,
                });
                report.insert(key.clone(), failed);
                continue;
            };

            let task = SourceTask {
                adapter,
                factory: self.factory.clone(),
                store: self.store.clone(),
                config: self.config.clone(),
                permits: permits.clone(),
                hosts: hosts.clone(),
                cancel: cancel.clone(),
                reporter: reporter.clone(),
            };
            let source = key.clone();
            pending.push(source.clone());
            tasks.spawn(async move {
                let result = AssertUnwindSafe(task.run()).catch_unwind().await;
                (source, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (source, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    tracing::error!(error = %e, "Source task aborted");
                    continue;
                }
            };
            pending.retain(|k| k != &source);
            let source_report = match result {
                Ok(source_report) => source_report,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    SourceReport::failed(
                        SourceStats::default(),
                        format!("source task panicked: {message}"),
                    )
                }
            };
            reporter.report(CrawlEvent::SourceFinished {
                source: &source,
                report: &source_report,
            });
            report.insert(source, source_report);
        }

        for source in pending {
            report.insert(
                source,
                SourceReport::failed(SourceStats::default(), "source task aborted"),
            );
        }

        reporter.report(CrawlEvent::RunFinished { report: &report });
        report
    }
}

/// Everything one source's task owns.
struct SourceTask<FF, S, R> {
    adapter: Arc<dyn SourceAdapter>,
    factory: FF,
    store: S,
    config: SchedulerConfig,
    permits: Arc<Semaphore>,
    hosts: HostThrottle,
    cancel: CancellationToken,
    reporter: Arc<R>,
}

impl<FF, S, R> SourceTask<FF, S, R>
where
    FF: FetcherFactory,
    S: ObservationStore,
    R: CrawlReporter,
{
    async fn run(self) -> SourceReport {
        let key = self.adapter.key();
        self.reporter.report(CrawlEvent::SourceStarted { source: key });

        let mode = self.adapter.render_mode();
        let engine = match self.factory.create(&mode).await {
            Ok(engine) => engine,
            Err(e) => return SourceReport::failed(SourceStats::default(), e.to_string()),
        };
        let fetcher = CachedFetcher::optional(engine, self.config.cache.clone());
        let scheduler = FetchScheduler::new(fetcher, self.permits.clone())
            .with_throttle(self.hosts.clone(), self.config.throttle_for(&mode))
            .with_max_pages(self.config.max_pages);

        let (tx, rx) = mpsc::channel(PAGE_BUFFER);
        let (outcome, (mut stats, consumer_cancelled)) = tokio::join!(
            scheduler.crawl(self.adapter.as_ref(), tx, &self.cancel),
            self.consume(rx),
        );
        record_outcome(&mut stats, &outcome);

        if outcome.cancelled() || consumer_cancelled {
            return SourceReport::failed(stats, AppError::Cancelled.to_string());
        }
        if outcome.all_failed() {
            let error = outcome
                .branches
                .iter()
                .find_map(|b| b.error.clone())
                .unwrap_or_else(|| "every branch failed".to_string());
            return SourceReport::failed(stats, format!("no page could be fetched: {error}"));
        }
        SourceReport {
            status: SourceStatus::Success,
            stats,
            error: None,
        }
    }

    /// Validate and persist pages as branches produce them.
    ///
    /// Returns the counters and whether the run was cancelled mid-stream.
    async fn consume(&self, mut pages: mpsc::Receiver<PageBatch>) -> (SourceStats, bool) {
        let key = self.adapter.key();
        let validator = RecordValidator::new();
        let mut stats = SourceStats::default();

        while let Some(batch) = pages.recv().await {
            stats.records_extracted += batch.records.len() as u64;
            stats.records_skipped += batch.skipped as u64;

            for candidate in batch.records {
                let record = match validator.validate(candidate, batch.fetched_at) {
                    Ok(record) => record,
                    Err(rejection) => {
                        stats.records_rejected += 1;
                        self.reporter.report(CrawlEvent::RecordRejected {
                            source: key,
                            rejection: &rejection,
                        });
                        continue;
                    }
                };

                // Dropping an unfinished merge rolls its transaction back.
                let merged = tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => return (stats, true),
                    merged = self.store.merge(&record) => merged,
                };
                match merged {
                    Ok(_) => stats.observations_saved += 1,
                    Err(e) => {
                        stats.persistence_failures += 1;
                        self.reporter.report(CrawlEvent::PersistenceFailed {
                            source: key,
                            sku: &record.sku,
                            url: record.url.as_str(),
                            error: &e.to_string(),
                        });
                    }
                }
            }
        }

        (stats, false)
    }
}

fn record_outcome(stats: &mut SourceStats, outcome: &CrawlOutcome) {
    stats.pages_fetched = u64::from(outcome.pages_fetched());
    stats.branches_failed = outcome.branches_failed() as u64;
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
