//! Job persistence seam.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::SchedulerResult;
use crate::SyncJob;

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn load_jobs(&self) -> SchedulerResult<Vec<SyncJob>>;
    async fn save_job(&self, job: &SyncJob) -> SchedulerResult<()>;
    async fn remove_job(&self, job_id: &str) -> SchedulerResult<()>;
    async fn update_fire_times(
        &self,
        job_id: &str,
        next_fire_at: Option<DateTime<Utc>>,
        last_fire_at: Option<DateTime<Utc>>,
    ) -> SchedulerResult<()>;
}

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, SyncJob>>,
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn load_jobs(&self) -> SchedulerResult<Vec<SyncJob>> {
        let mut jobs: Vec<SyncJob> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        Ok(jobs)
    }

    async fn save_job(&self, job: &SyncJob) -> SchedulerResult<()> {
        self.jobs
            .write()
            .await
            .insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn remove_job(&self, job_id: &str) -> SchedulerResult<()> {
        self.jobs.write().await.remove(job_id);
        Ok(())
    }

    async fn update_fire_times(
        &self,
        job_id: &str,
        next_fire_at: Option<DateTime<Utc>>,
        last_fire_at: Option<DateTime<Utc>>,
    ) -> SchedulerResult<()> {
        if let Some(job) = self.jobs.write().await.get_mut(job_id) {
            job.next_fire_at = next_fire_at;
            job.last_fire_at = last_fire_at;
        }
        Ok(())
    }
}
