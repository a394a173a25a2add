//! Job read operations: get, list, admission counts.

use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::super::db::JobDb;
use super::super::types::{JobMetadata, JobRecord, JobStatus, RunMode, RunningCounts};
use crate::phase::Phase;

const JOB_COLUMNS: &str = r#"
    job_id, phase, status, run_mode, source_name,
    source_bytes, page_count, outputs_requested, total_extracted_pages,
    split_chunk_size, backend, error_code, error_message,
    created_at, started_at, updated_at, finished_at, duration_ms
"#;

fn job_from_row(row: &SqliteRow) -> JobRecord {
    let phase: String = row.get("phase");
    let status: String = row.get("status");
    let run_mode: String = row.get("run_mode");
    JobRecord {
        job_id: row.get("job_id"),
        phase: Phase::parse(&phase).unwrap_or(Phase::Preflight),
        status: JobStatus::from_str(&status),
        run_mode: RunMode::from_str(&run_mode),
        source_name: row.get("source_name"),
        metadata: JobMetadata {
            source_bytes: row.get("source_bytes"),
            page_count: row.get("page_count"),
            outputs_requested: row.get("outputs_requested"),
            total_extracted_pages: row.get("total_extracted_pages"),
            split_chunk_size: row.get("split_chunk_size"),
            backend: row.get("backend"),
        },
        error_code: row.get("error_code"),
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
        started_at: row.get("started_at"),
        updated_at: row.get("updated_at"),
        finished_at: row.get("finished_at"),
        duration_ms: row.get("duration_ms"),
    }
}

impl JobDb {
    /// Fetch a single job row.
    pub async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let sql = format!("SELECT {} FROM jobs WHERE job_id = ?1", JOB_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(job_from_row))
    }

    /// List all jobs, newest first.
    pub async fn list_jobs(&self) -> Result<Vec<JobRecord>> {
        let sql = format!(
            "SELECT {} FROM jobs ORDER BY created_at DESC, job_id DESC",
            JOB_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(job_from_row).collect())
    }

    /// Jobs currently RUNNING, oldest first (used to resume after a restart).
    pub async fn list_running(&self) -> Result<Vec<JobRecord>> {
        let sql = format!(
            "SELECT {} FROM jobs WHERE status = 'running' ORDER BY created_at ASC, job_id ASC",
            JOB_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(job_from_row).collect())
    }

    /// Number of RUNNING jobs, overall and in async mode.
    pub async fn running_counts(&self) -> Result<RunningCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN run_mode = 'async' THEN 1 ELSE 0 END), 0) AS async_jobs
            FROM jobs
            WHERE status = 'running'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        let total: i64 = row.get("total");
        let async_jobs: i64 = row.get("async_jobs");
        Ok(RunningCounts {
            total: total as usize,
            async_jobs: async_jobs as usize,
        })
    }
}
