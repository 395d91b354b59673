use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::AppError;
use crate::job::{CrawlJob, JobStatus, WorkerConfig};
use crate::job_queue::JobQueue;
use crate::runner::{CrawlReport, CrawlReporter, CrawlRunner};
use crate::traits::{FetcherFactory, ObservationStore};

/// Events emitted by the worker for monitoring/logging.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    Started {
        worker_id: &'a str,
    },
    Polling,
    JobClaimed {
        job: &'a CrawlJob,
    },
    JobCompleted {
        job_id: Uuid,
        report: &'a CrawlReport,
    },
    JobCancelled {
        job_id: Uuid,
    },
    JobFailed {
        job_id: Uuid,
        error: &'a str,
    },
    ShuttingDown {
        worker_id: &'a str,
        jobs_released: u64,
    },
    Stopped {
        worker_id: &'a str,
    },
}

/// Trait for receiving worker events (decoupled logging).
pub trait WorkerReporter: Send + Sync {
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started { worker_id } => {
                tracing::info!(%worker_id, "Worker started");
            }
            WorkerEvent::Polling => {
                tracing::debug!("Polling for jobs");
            }
            WorkerEvent::JobClaimed { job } => {
                tracing::info!(job_id = %job.id, sources = ?job.sources, "Job claimed");
            }
            WorkerEvent::JobCompleted { job_id, report } => {
                tracing::info!(
                    %job_id,
                    succeeded = ?report.succeeded(),
                    failed = ?report.failed(),
                    "Job completed"
                );
            }
            WorkerEvent::JobCancelled { job_id } => {
                tracing::info!(%job_id, "Job cancelled while running");
            }
            WorkerEvent::JobFailed { job_id, error } => {
                tracing::warn!(%job_id, %error, "Job failed");
            }
            WorkerEvent::ShuttingDown {
                worker_id,
                jobs_released,
            } => {
                tracing::info!(%worker_id, %jobs_released, "Worker shutting down");
            }
            WorkerEvent::Stopped { worker_id } => {
                tracing::info!(%worker_id, "Worker stopped");
            }
        }
    }
}

/// Worker that polls the job queue and runs crawl jobs.
pub struct WorkerService<Q, FF, S>
where
    Q: JobQueue,
    FF: FetcherFactory,
    S: ObservationStore,
{
    queue: Q,
    runner: CrawlRunner<FF, S>,
    config: WorkerConfig,
}

impl<Q, FF, S> WorkerService<Q, FF, S>
where
    Q: JobQueue,
    FF: FetcherFactory + 'static,
    S: ObservationStore + 'static,
{
    pub fn new(queue: Q, runner: CrawlRunner<FF, S>, config: WorkerConfig) -> Self {
        Self {
            queue,
            runner,
            config,
        }
    }

    /// Run the worker loop until cancellation.
    pub async fn run<WR, CR>(
        &self,
        cancel_token: CancellationToken,
        reporter: &WR,
        crawl_reporter: Arc<CR>,
    ) -> Result<(), AppError>
    where
        WR: WorkerReporter,
        CR: CrawlReporter + 'static,
    {
        reporter.report(WorkerEvent::Started {
            worker_id: &self.config.worker_id,
        });

        loop {
            if cancel_token.is_cancelled() {
                break;
            }

            reporter.report(WorkerEvent::Polling);

            match self.queue.claim_job(&self.config.worker_id).await {
                Ok(Some(job)) => {
                    reporter.report(WorkerEvent::JobClaimed { job: &job });
                    self.process_job(&job, &cancel_token, reporter, crawl_reporter.clone())
                        .await;
                }
                Ok(None) => {
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval) => {}
                        () = cancel_token.cancelled() => break,
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim job");
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval * 2) => {}
                        () = cancel_token.cancelled() => break,
                    }
                }
            }
        }

        // Hand interrupted jobs back to the queue.
        let released = self
            .queue
            .release_worker_jobs(&self.config.worker_id)
            .await
            .unwrap_or(0);

        reporter.report(WorkerEvent::ShuttingDown {
            worker_id: &self.config.worker_id,
            jobs_released: released,
        });
        reporter.report(WorkerEvent::Stopped {
            worker_id: &self.config.worker_id,
        });

        Ok(())
    }

    async fn process_job<WR, CR>(
        &self,
        job: &CrawlJob,
        shutdown: &CancellationToken,
        reporter: &WR,
        crawl_reporter: Arc<CR>,
    ) where
        WR: WorkerReporter,
        CR: CrawlReporter + 'static,
    {
        if job.sources.is_empty() {
            let error = "job names no sources";
            reporter.report(WorkerEvent::JobFailed {
                job_id: job.id,
                error,
            });
            if let Err(e) = self.queue.fail_job(job.id, error).await {
                tracing::error!(job_id = %job.id, error = %e, "Failed to mark job as failed");
            }
            return;
        }

        let job_cancel = shutdown.child_token();
        let run = self.runner.run(&job.sources, &job_cancel, crawl_reporter);
        tokio::pin!(run);

        // Watch for a cancel request on the job itself while it runs.
        let report = loop {
            tokio::select! {
                report = &mut run => break report,
                () = tokio::time::sleep(self.config.poll_interval) => {
                    if let Ok(Some(current)) = self.queue.get_job(job.id).await
                        && current.status == JobStatus::Cancelled
                    {
                        job_cancel.cancel();
                    }
                }
            }
        };

        if shutdown.is_cancelled() {
            // Released back to pending on shutdown.
            return;
        }
        if job_cancel.is_cancelled() {
            reporter.report(WorkerEvent::JobCancelled { job_id: job.id });
            return;
        }

        reporter.report(WorkerEvent::JobCompleted {
            job_id: job.id,
            report: &report,
        });
        if let Err(e) = self.queue.complete_job(job.id, &report).await {
            tracing::error!(job_id = %job.id, error = %e, "Failed to mark job completed");
        }
    }
}
