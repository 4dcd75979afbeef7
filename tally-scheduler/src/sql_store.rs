//! Job store persisted in the warehouse database. The table is managed
//! here, not by application migrations; the trigger column is an opaque
//! serialized payload the scheduler alone understands.

use async_trait::async_trait;
use chrono::DateTime;
use chrono::NaiveDateTime;
use chrono::TimeZone;
use chrono::Utc;
use sqlx::MySqlPool;
use sqlx::Row;

use crate::JobStore;
use crate::JobTrigger;
use crate::SchedulerError;
use crate::SchedulerResult;
use crate::SyncJob;

const CREATE_SYNC_JOBS: &str = r"
CREATE TABLE IF NOT EXISTS sync_jobs (
    job_id       VARCHAR(255) NOT NULL,
    company_name VARCHAR(255) NOT NULL,
    enabled      TINYINT(1)   NOT NULL DEFAULT 1,
    trigger_spec TEXT         NOT NULL,
    next_fire_at DATETIME     NULL,
    last_fire_at DATETIME     NULL,
    updated_at   DATETIME     NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
    PRIMARY KEY (job_id)
) CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci
";

pub struct SqlJobStore {
    pool: MySqlPool,
}

impl SqlJobStore {
    pub async fn new(pool: MySqlPool) -> SchedulerResult<Self> {
        sqlx::query(CREATE_SYNC_JOBS)
            .execute(&pool)
            .await
            .map_err(storage_error)?;
        Ok(Self { pool })
    }
}

fn storage_error(err: sqlx::Error) -> SchedulerError {
    SchedulerError::Storage(err.to_string())
}

fn to_utc(naive: Option<NaiveDateTime>) -> Option<DateTime<Utc>> {
    naive.map(|value| Utc.from_utc_datetime(&value))
}

#[async_trait]
impl JobStore for SqlJobStore {
    async fn load_jobs(&self) -> SchedulerResult<Vec<SyncJob>> {
        let rows = sqlx::query(
            "SELECT job_id, company_name, enabled, trigger_spec, next_fire_at, last_fire_at \
             FROM sync_jobs ORDER BY job_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            let trigger_spec: String = row.try_get("trigger_spec").map_err(storage_error)?;
            let trigger: JobTrigger = serde_json::from_str(&trigger_spec).map_err(|err| {
                SchedulerError::Validation(format!("corrupt trigger payload: {err}"))
            })?;
            jobs.push(SyncJob {
                job_id: row.try_get("job_id").map_err(storage_error)?,
                company_name: row.try_get("company_name").map_err(storage_error)?,
                enabled: row.try_get("enabled").map_err(storage_error)?,
                trigger,
                next_fire_at: to_utc(
                    row.try_get::<Option<NaiveDateTime>, _>("next_fire_at")
                        .map_err(storage_error)?,
                ),
                last_fire_at: to_utc(
                    row.try_get::<Option<NaiveDateTime>, _>("last_fire_at")
                        .map_err(storage_error)?,
                ),
            });
        }
        Ok(jobs)
    }

    async fn save_job(&self, job: &SyncJob) -> SchedulerResult<()> {
        let trigger_spec = serde_json::to_string(&job.trigger)
            .map_err(|err| SchedulerError::Validation(err.to_string()))?;
        sqlx::query(
            "INSERT INTO sync_jobs (job_id, company_name, enabled, trigger_spec, \
             next_fire_at, last_fire_at) VALUES (?, ?, ?, ?, ?, ?) \
             ON DUPLICATE KEY UPDATE company_name = ?, enabled = ?, trigger_spec = ?, \
             next_fire_at = ?, last_fire_at = ?",
        )
        .bind(&job.job_id)
        .bind(&job.company_name)
        .bind(job.enabled)
        .bind(&trigger_spec)
        .bind(job.next_fire_at.map(|value| value.naive_utc()))
        .bind(job.last_fire_at.map(|value| value.naive_utc()))
        .bind(&job.company_name)
        .bind(job.enabled)
        .bind(&trigger_spec)
        .bind(job.next_fire_at.map(|value| value.naive_utc()))
        .bind(job.last_fire_at.map(|value| value.naive_utc()))
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn remove_job(&self, job_id: &str) -> SchedulerResult<()> {
        sqlx::query("DELETE FROM sync_jobs WHERE job_id = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn update_fire_times(
        &self,
        job_id: &str,
        next_fire_at: Option<DateTime<Utc>>,
        last_fire_at: Option<DateTime<Utc>>,
    ) -> SchedulerResult<()> {
        sqlx::query("UPDATE sync_jobs SET next_fire_at = ?, last_fire_at = ? WHERE job_id = ?")
            .bind(next_fire_at.map(|value| value.naive_utc()))
            .bind(last_fire_at.map(|value| value.naive_utc()))
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}
