//! Job write operations: admission-guarded insert/flip, metadata, finish.

use anyhow::Result;

use super::super::db::{unix_millis, JobDb};
use super::super::types::{JobMetadata, JobStatus, NewJob};
use crate::phase::Phase;

impl JobDb {
    /// Insert a new job as RUNNING, but only while the running ceilings have room.
    ///
    /// The count and the insert are one statement, so two concurrent
    /// submissions can never both take the last slot. Returns `false` when
    /// the job was not admitted.
    pub async fn try_insert_running(
        &self,
        job: &NewJob,
        max_total: usize,
        max_async: usize,
    ) -> Result<bool> {
        let now = unix_millis();
        let inserted = sqlx::query(
            r#"
            INSERT INTO jobs (
                job_id, phase, status, run_mode, source_name,
                created_at, started_at, updated_at
            )
            SELECT ?1, ?2, 'running', ?3, ?4, ?5, ?5, ?5
            WHERE (SELECT COUNT(*) FROM jobs WHERE status = 'running') < ?6
              AND (?3 <> 'async'
                   OR (SELECT COUNT(*) FROM jobs
                       WHERE status = 'running' AND run_mode = 'async') < ?7)
            "#,
        )
        .bind(&job.job_id)
        .bind(Phase::Preflight.as_str())
        .bind(job.run_mode.as_str())
        .bind(&job.source_name)
        .bind(now)
        .bind(max_total as i64)
        .bind(max_async as i64)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(inserted == 1)
    }

    /// Flip an existing job to RUNNING in `phase` if the ceilings allow it.
    ///
    /// A job that is already RUNNING keeps its slot and is always accepted.
    /// Returns `false` when not admitted or when the job does not exist.
    pub async fn try_mark_running(
        &self,
        job_id: &str,
        phase: Phase,
        max_total: usize,
        max_async: usize,
    ) -> Result<bool> {
        let now = unix_millis();
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET phase = ?2,
                started_at = CASE WHEN status = 'running' THEN started_at ELSE ?3 END,
                status = 'running',
                updated_at = ?3,
                finished_at = NULL,
                duration_ms = NULL,
                error_code = NULL,
                error_message = NULL
            WHERE job_id = ?1
              AND (status = 'running'
                   OR ((SELECT COUNT(*) FROM jobs WHERE status = 'running') < ?4
                       AND (run_mode <> 'async'
                            OR (SELECT COUNT(*) FROM jobs
                                WHERE status = 'running' AND run_mode = 'async') < ?5)))
            "#,
        )
        .bind(job_id)
        .bind(phase.as_str())
        .bind(now)
        .bind(max_total as i64)
        .bind(max_async as i64)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated == 1)
    }

    /// Record the phase the job is currently in.
    pub async fn set_phase(&self, job_id: &str, phase: Phase) -> Result<()> {
        sqlx::query("UPDATE jobs SET phase = ?1, updated_at = ?2 WHERE job_id = ?3")
            .bind(phase.as_str())
            .bind(unix_millis())
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Store what preflight learned about the source.
    pub async fn update_metadata(&self, job_id: &str, meta: &JobMetadata) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET source_bytes = ?1,
                page_count = ?2,
                outputs_requested = ?3,
                total_extracted_pages = ?4,
                split_chunk_size = ?5,
                backend = ?6,
                updated_at = ?7
            WHERE job_id = ?8
            "#,
        )
        .bind(meta.source_bytes)
        .bind(meta.page_count)
        .bind(meta.outputs_requested)
        .bind(meta.total_extracted_pages)
        .bind(meta.split_chunk_size)
        .bind(&meta.backend)
        .bind(unix_millis())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Leave RUNNING with a final status; stamps `finished_at` and `duration_ms`.
    pub async fn finish_job(
        &self,
        job_id: &str,
        status: JobStatus,
        error_code: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let now = unix_millis();
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?1,
                error_code = ?2,
                error_message = ?3,
                finished_at = ?4,
                duration_ms = MAX(0, ?4 - started_at),
                updated_at = ?4
            WHERE job_id = ?5
            "#,
        )
        .bind(status.as_str())
        .bind(error_code)
        .bind(error_message)
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
