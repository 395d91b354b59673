use std::collections::BTreeMap;

use pricewatch_core::job::JobStatus;
use pricewatch_core::job_queue::JobQueue;
use pricewatch_core::runner::{CrawlReport, SourceReport, SourceStats, SourceStatus};
use pricewatch_db::CrawlJobRepository;

use crate::integration::common::setup_test_db;

fn sources() -> Vec<String> {
    vec!["books".to_string(), "ecommerce".to_string()]
}

fn report() -> CrawlReport {
    let books = SourceReport {
        status: SourceStatus::Success,
        stats: SourceStats {
            pages_fetched: 50,
            records_extracted: 1000,
            observations_saved: 998,
            records_rejected: 2,
            ..SourceStats::default()
        },
        error: None,
    };
    let ecommerce = SourceReport {
        status: SourceStatus::Failed,
        stats: SourceStats::default(),
        error: Some("Render error: browser unavailable".into()),
    };
    CrawlReport {
        sources: BTreeMap::from([("books".into(), books), ("ecommerce".into(), ecommerce)]),
        totals: SourceStats {
            pages_fetched: 50,
            records_extracted: 1000,
            observations_saved: 998,
            records_rejected: 2,
            ..SourceStats::default()
        },
    }
}

#[tokio::test]
async fn create_job_and_verify_fields() {
    let (pool, _container) = setup_test_db().await;
    let repo = CrawlJobRepository::new(pool);

    let job = repo.create_job(&sources()).await.unwrap();

    assert_eq!(job.sources, sources());
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.results.is_none());
    assert!(job.worker_id.is_none());
    assert!(job.started_at.is_none());
}

#[tokio::test]
async fn claim_job_sets_running_and_worker() {
    let (pool, _container) = setup_test_db().await;
    let repo = CrawlJobRepository::new(pool);

    repo.create_job(&sources()).await.unwrap();

    let claimed = repo
        .claim_job("worker-1")
        .await
        .unwrap()
        .expect("Should claim the job");

    assert_eq!(claimed.status, JobStatus::Running);
    assert_eq!(claimed.worker_id.as_deref(), Some("worker-1"));
    assert!(claimed.started_at.is_some());

    assert!(repo.claim_job("worker-2").await.unwrap().is_none());
}

#[tokio::test]
async fn claims_oldest_pending_first() {
    let (pool, _container) = setup_test_db().await;
    let repo = CrawlJobRepository::new(pool);

    let first = repo.create_job(&["books".to_string()]).await.unwrap();
    let second = repo.create_job(&["ecommerce".to_string()]).await.unwrap();

    assert_eq!(repo.claim_job("w").await.unwrap().unwrap().id, first.id);
    assert_eq!(repo.claim_job("w").await.unwrap().unwrap().id, second.id);
}

#[tokio::test]
async fn concurrent_claims_never_share_a_job() {
    let (pool, _container) = setup_test_db().await;
    let repo = CrawlJobRepository::new(pool);

    for _ in 0..3 {
        repo.create_job(&sources()).await.unwrap();
    }

    let claims = futures::future::join_all(
        (0..6).map(|i| {
            let repo = repo.clone();
            async move { repo.claim_job(&format!("worker-{i}")).await.unwrap() }
        }),
    )
    .await;

    let mut ids: Vec<_> = claims.into_iter().flatten().map(|j| j.id).collect();
    assert_eq!(ids.len(), 3);
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
}

#[tokio::test]
async fn complete_job_stores_per_source_results() {
    let (pool, _container) = setup_test_db().await;
    let repo = CrawlJobRepository::new(pool);

    let job = repo.create_job(&sources()).await.unwrap();
    repo.claim_job("worker-1").await.unwrap();
    repo.complete_job(job.id, &report()).await.unwrap();

    let updated = repo.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(updated.status, JobStatus::Completed);
    assert!(updated.completed_at.is_some());
    assert!(updated.worker_id.is_none());

    let results = updated.results.expect("results stored");
    assert_eq!(results, report());
    assert_eq!(results.status_of("books"), Some(SourceStatus::Success));
    assert_eq!(results.status_of("ecommerce"), Some(SourceStatus::Failed));
}

#[tokio::test]
async fn fail_job_records_error() {
    let (pool, _container) = setup_test_db().await;
    let repo = CrawlJobRepository::new(pool);

    let job = repo.create_job(&sources()).await.unwrap();
    repo.claim_job("worker-1").await.unwrap();
    repo.fail_job(job.id, "runner unavailable").await.unwrap();

    let updated = repo.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(updated.status, JobStatus::Failed);
    assert_eq!(updated.error_message.as_deref(), Some("runner unavailable"));
    assert!(updated.worker_id.is_none());
}

#[tokio::test]
async fn cancel_pending_and_running_jobs() {
    let (pool, _container) = setup_test_db().await;
    let repo = CrawlJobRepository::new(pool);

    let pending = repo.create_job(&sources()).await.unwrap();
    assert!(repo.cancel_job(pending.id).await.unwrap());

    let running = repo.create_job(&sources()).await.unwrap();
    repo.claim_job("worker-1").await.unwrap();
    assert!(repo.cancel_job(running.id).await.unwrap());

    // A cancelled run is not overwritten when the worker finishes.
    repo.complete_job(running.id, &report()).await.unwrap();
    let updated = repo.get_job(running.id).await.unwrap().unwrap();
    assert_eq!(updated.status, JobStatus::Cancelled);
    assert!(updated.results.is_none());

    assert_eq!(repo.count_by_status(JobStatus::Cancelled).await.unwrap(), 2);
}

#[tokio::test]
async fn cancel_job_ignores_terminal_and_unknown() {
    let (pool, _container) = setup_test_db().await;
    let repo = CrawlJobRepository::new(pool);

    let job = repo.create_job(&sources()).await.unwrap();
    repo.claim_job("worker-1").await.unwrap();
    repo.complete_job(job.id, &report()).await.unwrap();

    assert!(!repo.cancel_job(job.id).await.unwrap());
    assert!(!repo.cancel_job(uuid::Uuid::new_v4()).await.unwrap());

    let updated = repo.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(updated.status, JobStatus::Completed);
}

#[tokio::test]
async fn release_worker_jobs_on_shutdown() {
    let (pool, _container) = setup_test_db().await;
    let repo = CrawlJobRepository::new(pool);

    repo.create_job(&sources()).await.unwrap();
    repo.create_job(&sources()).await.unwrap();
    repo.create_job(&sources()).await.unwrap();

    repo.claim_job("worker-1").await.unwrap();
    repo.claim_job("worker-1").await.unwrap();
    repo.claim_job("worker-2").await.unwrap();

    let released = repo.release_worker_jobs("worker-1").await.unwrap();
    assert_eq!(released, 2);

    assert_eq!(repo.count_by_status(JobStatus::Pending).await.unwrap(), 2);
    assert_eq!(repo.count_by_status(JobStatus::Running).await.unwrap(), 1);
}

#[tokio::test]
async fn list_jobs_with_status_filter() {
    let (pool, _container) = setup_test_db().await;
    let repo = CrawlJobRepository::new(pool);

    repo.create_job(&sources()).await.unwrap();
    repo.create_job(&sources()).await.unwrap();
    repo.claim_job("worker-1").await.unwrap();

    let pending = repo.list_jobs(Some(JobStatus::Pending), 10).await.unwrap();
    assert_eq!(pending.len(), 1);

    let running = repo.list_jobs(Some(JobStatus::Running), 10).await.unwrap();
    assert_eq!(running.len(), 1);

    let all = repo.list_jobs(None, 10).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(all[0].created_at >= all[1].created_at);

    assert_eq!(repo.list_jobs(None, 1).await.unwrap().len(), 1);
}
