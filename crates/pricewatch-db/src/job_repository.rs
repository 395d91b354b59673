use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use pricewatch_core::error::AppError;
use pricewatch_core::job::{CrawlJob, JobStatus};
use pricewatch_core::job_queue::JobQueue;
use pricewatch_core::runner::CrawlReport;

/// PostgreSQL-backed crawl job queue using `SELECT FOR UPDATE SKIP LOCKED`.
#[derive(Clone)]
pub struct CrawlJobRepository {
    pool: Pool<Postgres>,
}

impl CrawlJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CrawlJobRow {
    id: Uuid,
    sources: Vec<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    results: Option<serde_json::Value>,
    error_message: Option<String>,
    worker_id: Option<String>,
}

impl From<CrawlJobRow> for CrawlJob {
    fn from(row: CrawlJobRow) -> Self {
        let results = row.results.and_then(|value| {
            serde_json::from_value::<CrawlReport>(value)
                .inspect_err(|e| {
                    tracing::warn!(job_id = %row.id, error = %e, "Unreadable job results")
                })
                .ok()
        });

        CrawlJob {
            id: row.id,
            sources: row.sources,
            status: row.status.parse().unwrap_or(JobStatus::Pending),
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            results,
            error_message: row.error_message,
            worker_id: row.worker_id,
        }
    }
}

fn db_error(err: sqlx::Error) -> AppError {
    AppError::DatabaseError(err.to_string())
}

impl JobQueue for CrawlJobRepository {
    async fn create_job(&self, sources: &[String]) -> Result<CrawlJob, AppError> {
        let row = sqlx::query_as::<_, CrawlJobRow>(
            r#"
            INSERT INTO crawl_jobs (sources)
            VALUES ($1)
            RETURNING *
            "#,
        )
        .bind(sources)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.into())
    }

    async fn claim_job(&self, worker_id: &str) -> Result<Option<CrawlJob>, AppError> {
        let row = sqlx::query_as::<_, CrawlJobRow>(
            r#"
            UPDATE crawl_jobs
            SET status = 'running', worker_id = $1, started_at = NOW(), updated_at = NOW()
            WHERE id = (
                SELECT id FROM crawl_jobs
                WHERE status = 'pending'
                ORDER BY created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.map(Into::into))
    }

    async fn complete_job(&self, job_id: Uuid, report: &CrawlReport) -> Result<(), AppError> {
        let results = serde_json::to_value(report)?;

        sqlx::query(
            r#"
            UPDATE crawl_jobs
            SET status = 'completed', completed_at = NOW(), updated_at = NOW(),
                results = $2, error_message = NULL, worker_id = NULL
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(job_id)
        .bind(results)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn fail_job(&self, job_id: Uuid, error: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE crawl_jobs
            SET status = 'failed', completed_at = NOW(), updated_at = NOW(),
                error_message = $2, worker_id = NULL
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(job_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn cancel_job(&self, job_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE crawl_jobs
            SET status = 'cancelled', completed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'running')
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<CrawlJob>, AppError> {
        let row = sqlx::query_as::<_, CrawlJobRow>(r#"SELECT * FROM crawl_jobs WHERE id = $1"#)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(row.map(Into::into))
    }

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<CrawlJob>, AppError> {
        let rows = sqlx::query_as::<_, CrawlJobRow>(
            r#"
            SELECT * FROM crawl_jobs
            WHERE ($1::varchar IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn release_worker_jobs(&self, worker_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE crawl_jobs
            SET status = 'pending', worker_id = NULL, started_at = NULL, updated_at = NOW()
            WHERE worker_id = $1 AND status = 'running'
            "#,
        )
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected())
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64, AppError> {
        let (count,): (i64,) =
            sqlx::query_as(r#"SELECT COUNT(*) FROM crawl_jobs WHERE status = $1"#)
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(db_error)?;

        Ok(count)
    }
}
