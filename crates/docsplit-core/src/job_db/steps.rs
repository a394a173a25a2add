//! Per-phase step rows: one per attempt, opened on start and closed by the finalizer.

use anyhow::Result;
use sqlx::Row;

use super::db::{unix_millis, JobDb};
use super::types::StepRecord;
use crate::phase::{Phase, PhaseStatus};
use crate::state_store::Counts;

impl JobDb {
    /// Open a new RUNNING step for `phase`. Returns its attempt number (1-based).
    pub async fn open_step(&self, job_id: &str, phase: Phase, total: u32) -> Result<i64> {
        let now = unix_millis();
        let mut tx = self.pool.begin().await?;
        let attempt: i64 = sqlx::query(
            "SELECT COALESCE(MAX(attempt), 0) + 1 AS next FROM job_steps WHERE job_id = ?1 AND phase = ?2",
        )
        .bind(job_id)
        .bind(phase.as_str())
        .fetch_one(&mut *tx)
        .await?
        .get("next");
        sqlx::query(
            r#"
            INSERT INTO job_steps (job_id, phase, attempt, status, started_at, total)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(job_id)
        .bind(phase.as_str())
        .bind(attempt)
        .bind(PhaseStatus::Running.as_str())
        .bind(now)
        .bind(i64::from(total))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(attempt)
    }

    /// Close the latest step of `phase` with its outcome and counts.
    /// A step that is already closed is left untouched.
    pub async fn close_step(
        &self,
        job_id: &str,
        phase: Phase,
        status: PhaseStatus,
        counts: Counts,
        error_code: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let now = unix_millis();
        sqlx::query(
            r#"
            UPDATE job_steps
            SET status = ?1,
                finished_at = ?2,
                duration_ms = MAX(0, ?2 - started_at),
                total = ?3,
                done = ?4,
                failed = ?5,
                error_code = ?6,
                error_message = ?7
            WHERE id = (
                SELECT id FROM job_steps
                WHERE job_id = ?8 AND phase = ?9
                ORDER BY id DESC
                LIMIT 1
            )
              AND status = ?10
            "#,
        )
        .bind(status.as_str())
        .bind(now)
        .bind(i64::from(counts.total))
        .bind(i64::from(counts.done))
        .bind(i64::from(counts.failed))
        .bind(error_code)
        .bind(error_message)
        .bind(job_id)
        .bind(phase.as_str())
        .bind(PhaseStatus::Running.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// All steps of a job in the order they were opened.
    pub async fn list_steps(&self, job_id: &str) -> Result<Vec<StepRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, job_id, phase, attempt, status, started_at, finished_at,
                   duration_ms, total, done, failed, error_code, error_message
            FROM job_steps
            WHERE job_id = ?1
            ORDER BY id ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let phase: String = row.get("phase");
            let status: String = row.get("status");
            out.push(StepRecord {
                id: row.get("id"),
                job_id: row.get("job_id"),
                phase: Phase::parse(&phase).unwrap_or(Phase::Preflight),
                attempt: row.get("attempt"),
                status: PhaseStatus::from_str(&status),
                started_at: row.get("started_at"),
                finished_at: row.get("finished_at"),
                duration_ms: row.get("duration_ms"),
                total: row.get("total"),
                done: row.get("done"),
                failed: row.get("failed"),
                error_code: row.get("error_code"),
                error_message: row.get("error_message"),
            });
        }
        Ok(out)
    }
}
