#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Persistent per-tenant sync scheduler.
//!
//! One job per tenant, fired on an interval or at a daily wall-clock
//! time. Jobs survive restarts because the payload is only primitives
//! (a runtime key plus the company name); live collaborators are looked
//! up from the process-global registry at fire time. Missed fires
//! coalesce into a single catch-up run, a single fire later than the
//! misfire grace is dropped, and overlapping fires of the same job are
//! refused.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use chrono::DateTime;
use chrono::FixedOffset;
use chrono::TimeZone;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

mod sql_store;
mod store;

pub use sql_store::SqlJobStore;
pub use store::InMemoryJobStore;
pub use store::JobStore;

use tally_sync::ProgressEvent;
use tally_sync::RuntimeKey;

pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("validation error: {0}")]
    Validation(String),
}

/// Default grace for a late single fire; anything later is dropped.
pub const MISFIRE_GRACE: Duration = Duration::from_secs(300);

/// Job trigger, serialized as JSON into the job store so persisted jobs
/// are restorable after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobTrigger {
    Interval { minutes: u32 },
    Daily { hour: u8, minute: u8 },
}

impl JobTrigger {
    /// Next fire strictly after `now`. Daily triggers are evaluated in
    /// the scheduler's fixed timezone.
    #[must_use]
    pub fn next_fire(&self, now: DateTime<Utc>, timezone: FixedOffset) -> DateTime<Utc> {
        match self {
            JobTrigger::Interval { minutes } => {
                now + chrono::Duration::minutes(i64::from((*minutes).max(1)))
            }
            JobTrigger::Daily { hour, minute } => {
                let local = now.with_timezone(&timezone);
                let today = local
                    .date_naive()
                    .and_hms_opt(u32::from(*hour).min(23), u32::from(*minute).min(59), 0)
                    .unwrap_or_else(|| local.date_naive().and_hms_opt(9, 0, 0).expect("valid"));
                let candidate = timezone
                    .from_local_datetime(&today)
                    .single()
                    .unwrap_or(local);
                let candidate = if candidate > local {
                    candidate
                } else {
                    candidate + chrono::Duration::days(1)
                };
                candidate.with_timezone(&Utc)
            }
        }
    }

    /// Nominal period between fires, used to recognize multi-miss
    /// catch-up situations.
    #[must_use]
    pub fn period(&self) -> Duration {
        match self {
            JobTrigger::Interval { minutes } => {
                Duration::from_secs(u64::from((*minutes).max(1)) * 60)
            }
            JobTrigger::Daily { .. } => Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// A persisted scheduler job for one tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    pub job_id: String,
    pub company_name: String,
    pub enabled: bool,
    pub trigger: JobTrigger,
    pub next_fire_at: Option<DateTime<Utc>>,
    pub last_fire_at: Option<DateTime<Utc>>,
}

/// Stable job id from a tenant name.
#[must_use]
pub fn job_slug(company_name: &str) -> String {
    let cleaned: String = company_name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect();
    format!("sync_{cleaned}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireDecision {
    Wait,
    Run,
    Misfire,
}

/// Decide what a due job does. A fire within the grace window runs; a
/// backlog of several missed fires coalesces into one catch-up run; a
/// single fire beyond the grace is dropped.
#[must_use]
pub fn fire_decision(
    now: DateTime<Utc>,
    next_fire: DateTime<Utc>,
    period: Duration,
    grace: Duration,
) -> FireDecision {
    if next_fire > now {
        return FireDecision::Wait;
    }
    let lateness = (now - next_fire)
        .to_std()
        .unwrap_or(Duration::ZERO);
    if lateness <= grace {
        return FireDecision::Run;
    }
    if lateness >= period {
        return FireDecision::Run;
    }
    FireDecision::Misfire
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub timezone: FixedOffset,
    pub poll_interval: Duration,
    pub misfire_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            // IST; the deployment this grew out of runs in one timezone.
            timezone: FixedOffset::east_opt(5 * 3600 + 1800).expect("fixed offset"),
            poll_interval: Duration::from_secs(30),
            misfire_grace: MISFIRE_GRACE,
        }
    }
}

pub struct Scheduler {
    store: Arc<dyn JobStore>,
    runtime_key: RuntimeKey,
    config: SchedulerConfig,
    running: Arc<Mutex<HashSet<String>>>,
    cancel: CancellationToken,
}

impl Scheduler {
    #[must_use]
    pub fn new(store: Arc<dyn JobStore>, runtime_key: RuntimeKey, config: SchedulerConfig) -> Self {
        Self {
            store,
            runtime_key,
            config,
            running: Arc::new(Mutex::new(HashSet::new())),
            cancel: CancellationToken::new(),
        }
    }

    /// Create or reschedule the job for a tenant. Safe to call when the
    /// job already exists.
    pub async fn add_or_update_job(
        &self,
        company_name: &str,
        trigger: JobTrigger,
        enabled: bool,
    ) -> SchedulerResult<SyncJob> {
        let now = Utc::now();
        let job = SyncJob {
            job_id: job_slug(company_name),
            company_name: company_name.to_string(),
            enabled,
            next_fire_at: enabled.then(|| trigger.next_fire(now, self.config.timezone)),
            last_fire_at: None,
            trigger,
        };
        self.store.save_job(&job).await?;
        info!("job added/updated: {}", job.job_id);
        self.notify_schedule_update(company_name);
        Ok(job)
    }

    pub async fn remove_job(&self, company_name: &str) -> SchedulerResult<()> {
        self.store.remove_job(&job_slug(company_name)).await?;
        info!("job removed: {}", job_slug(company_name));
        self.notify_schedule_update(company_name);
        Ok(())
    }

    pub async fn jobs(&self) -> SchedulerResult<Vec<SyncJob>> {
        self.store.load_jobs().await
    }

    /// Run the polling loop until shutdown. On start every enabled job
    /// is loaded from the store; jobs persisted by a previous process
    /// resume seamlessly.
    pub async fn run(self: Arc<Self>) {
        info!("scheduler started");
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(self.config.poll_interval) => {}
            }
            self.tick(Utc::now()).await;
        }
        info!("scheduler stopped");
    }

    /// Stop the loop without waiting for in-flight runs; the chunk
    /// watermark recovers whatever they leave behind.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// One evaluation pass over the persisted jobs.
    pub async fn tick(&self, now: DateTime<Utc>) {
        let jobs = match self.store.load_jobs().await {
            Ok(jobs) => jobs,
            Err(err) => {
                error!("failed to load scheduler jobs: {err}");
                return;
            }
        };

        for job in jobs.into_iter().filter(|job| job.enabled) {
            let Some(next_fire) = job.next_fire_at else {
                // Freshly enabled or imported job: give it a schedule.
                let next = job.trigger.next_fire(now, self.config.timezone);
                if let Err(err) = self
                    .store
                    .update_fire_times(&job.job_id, Some(next), job.last_fire_at)
                    .await
                {
                    error!("failed to schedule {}: {err}", job.job_id);
                }
                continue;
            };

            match fire_decision(now, next_fire, job.trigger.period(), self.config.misfire_grace) {
                FireDecision::Wait => {}
                FireDecision::Misfire => {
                    warn!(
                        "job {} missed its fire at {next_fire}, dropping",
                        job.job_id
                    );
                    let next = job.trigger.next_fire(now, self.config.timezone);
                    if let Err(err) = self
                        .store
                        .update_fire_times(&job.job_id, Some(next), job.last_fire_at)
                        .await
                    {
                        error!("failed to reschedule {}: {err}", job.job_id);
                    }
                }
                FireDecision::Run => {
                    // Rescheduling from `now` is what coalesces any
                    // backlog of missed fires into this single run.
                    let next = job.trigger.next_fire(now, self.config.timezone);
                    if let Err(err) = self
                        .store
                        .update_fire_times(&job.job_id, Some(next), Some(now))
                        .await
                    {
                        error!("failed to reschedule {}: {err}", job.job_id);
                        continue;
                    }
                    self.spawn_run(job);
                }
            }
        }
    }

    fn try_begin_run(&self, job_id: &str) -> bool {
        self.running
            .lock()
            .map(|mut running| running.insert(job_id.to_string()))
            .unwrap_or(false)
    }

    fn finish_run(running: &Mutex<HashSet<String>>, job_id: &str) {
        if let Ok(mut running) = running.lock() {
            running.remove(job_id);
        }
    }

    fn spawn_run(&self, job: SyncJob) {
        if !self.try_begin_run(&job.job_id) {
            warn!("skipping {}: sync already running", job.job_id);
            return;
        }
        let Some(runtime) = tally_sync::runtime(self.runtime_key) else {
            error!("runtime key not registered, job {} orphaned", job.job_id);
            Self::finish_run(&self.running, &job.job_id);
            return;
        };

        let running = Arc::clone(&self.running);
        let timezone = self.config.timezone;
        tokio::spawn(async move {
            info!("scheduled sync triggered for {}", job.company_name);
            let engine = runtime.engine();
            let today = Utc::now().with_timezone(&timezone).date_naive();
            let report = engine.run_company(&job.company_name, today, None).await;
            if report.success() {
                debug!("scheduled sync for {} finished", job.company_name);
            } else {
                error!(
                    "scheduled sync for {} finished with errors (exit {})",
                    job.company_name,
                    report.exit_code()
                );
            }
            runtime.sink.emit(ProgressEvent::SchedulerUpdated {
                company: job.company_name.clone(),
            });
            Self::finish_run(&running, &job.job_id);
        });
    }

    fn notify_schedule_update(&self, company_name: &str) {
        if let Some(runtime) = tally_sync::runtime(self.runtime_key) {
            runtime.sink.emit(ProgressEvent::SchedulerUpdated {
                company: company_name.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        chrono::NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, 0))
            .map(|naive| Utc.from_utc_datetime(&naive))
            .expect("timestamp")
    }

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(5 * 3600 + 1800).expect("offset")
    }

    #[test]
    fn interval_trigger_adds_minutes() {
        let trigger = JobTrigger::Interval { minutes: 90 };
        let now = utc(2024, 7, 1, 10, 0);
        assert_eq!(trigger.next_fire(now, ist()), utc(2024, 7, 1, 11, 30));
    }

    #[test]
    fn daily_trigger_uses_the_fixed_timezone() {
        let trigger = JobTrigger::Daily { hour: 23, minute: 0 };
        // 16:00 UTC is 21:30 IST, so 23:00 IST today is still ahead.
        let now = utc(2024, 7, 1, 16, 0);
        assert_eq!(trigger.next_fire(now, ist()), utc(2024, 7, 1, 17, 30));

        // 18:00 UTC is 23:30 IST: today's slot has passed.
        let now = utc(2024, 7, 1, 18, 0);
        assert_eq!(trigger.next_fire(now, ist()), utc(2024, 7, 2, 17, 30));
    }

    #[test]
    fn trigger_serializes_to_stable_json() {
        let trigger = JobTrigger::Daily { hour: 9, minute: 30 };
        let json = serde_json::to_string(&trigger).expect("serialize");
        assert_eq!(json, r#"{"type":"daily","hour":9,"minute":30}"#);
        let back: JobTrigger = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, trigger);

        let interval = JobTrigger::Interval { minutes: 60 };
        let json = serde_json::to_string(&interval).expect("serialize");
        let back: JobTrigger = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, interval);
    }

    #[test]
    fn slug_replaces_awkward_characters() {
        assert_eq!(job_slug("Demo Co (2024)"), "sync_Demo_Co__2024_");
        assert_eq!(job_slug("plain"), "sync_plain");
    }

    #[test]
    fn fire_decisions_cover_grace_and_coalescing() {
        let period = Duration::from_secs(3600);
        let grace = MISFIRE_GRACE;
        let next = utc(2024, 7, 1, 10, 0);

        // Not due yet.
        assert_eq!(
            fire_decision(utc(2024, 7, 1, 9, 59), next, period, grace),
            FireDecision::Wait
        );
        // Two minutes late: inside the grace window.
        assert_eq!(
            fire_decision(utc(2024, 7, 1, 10, 2), next, period, grace),
            FireDecision::Run
        );
        // Ten minutes late: outside the grace window, only one fire
        // missed, dropped.
        assert_eq!(
            fire_decision(utc(2024, 7, 1, 10, 10), next, period, grace),
            FireDecision::Misfire
        );
        // Three hours late: several fires missed while the process was
        // down; they coalesce into exactly one catch-up run.
        assert_eq!(
            fire_decision(utc(2024, 7, 1, 13, 0), next, period, grace),
            FireDecision::Run
        );
    }

    mod scheduler {
        use super::*;
        use pretty_assertions::assert_eq;
        use async_trait::async_trait;
        use chrono::NaiveDate;
        use std::sync::Arc;
        use tally_ingest::VoucherKind;
        use tally_sync::NullSink;
        use tally_sync::SyncConfig;
        use tally_sync::SyncRuntime;
        use tally_sync::Upstream;
        use tally_sync::register_runtime;
        use tally_sync::unregister_runtime;
        use tally_upstream::UpstreamResult;
        use tally_warehouse::InMemoryWarehouse;

        struct NoopUpstream;

        #[async_trait]
        impl Upstream for NoopUpstream {
            async fn probe(&self) -> UpstreamResult<()> {
                Ok(())
            }
            async fn fetch_ledgers(&self, _company_name: &str) -> UpstreamResult<String> {
                Ok(String::new())
            }
            async fn fetch_trial_balance(
                &self,
                _company_name: &str,
                _from_date: NaiveDate,
                _to_date: NaiveDate,
            ) -> UpstreamResult<String> {
                Ok(String::new())
            }
            async fn fetch_snapshot(
                &self,
                _kind: VoucherKind,
                _company_name: &str,
                _from_date: NaiveDate,
                _to_date: NaiveDate,
            ) -> UpstreamResult<String> {
                Ok(String::new())
            }
            async fn fetch_cdc(
                &self,
                _kind: VoucherKind,
                _company_name: &str,
                _last_alter_id: i64,
            ) -> UpstreamResult<String> {
                Ok(String::new())
            }
        }

        fn scheduler_fixture() -> (Arc<Scheduler>, Arc<InMemoryJobStore>, RuntimeKey) {
            let key = register_runtime(Arc::new(SyncRuntime {
                upstream: Arc::new(NoopUpstream),
                warehouse: Arc::new(InMemoryWarehouse::new()),
                sink: Arc::new(NullSink),
                config: SyncConfig::default(),
            }));
            let store = Arc::new(InMemoryJobStore::default());
            let scheduler = Arc::new(Scheduler::new(
                Arc::clone(&store) as Arc<dyn JobStore>,
                key,
                SchedulerConfig::default(),
            ));
            (scheduler, store, key)
        }

        #[tokio::test]
        async fn due_job_reschedules_and_records_the_fire() {
            let (scheduler, store, key) = scheduler_fixture();
            let job = scheduler
                .add_or_update_job("Demo Co", JobTrigger::Interval { minutes: 60 }, true)
                .await
                .expect("job saved");

            // Force the job due two minutes ago.
            let now = Utc::now();
            store
                .update_fire_times(
                    &job.job_id,
                    Some(now - chrono::Duration::minutes(2)),
                    None,
                )
                .await
                .expect("force due");

            scheduler.tick(now).await;

            let jobs = store.load_jobs().await.expect("load");
            assert_eq!(jobs.len(), 1);
            assert_eq!(jobs[0].last_fire_at, Some(now));
            assert!(jobs[0].next_fire_at.expect("scheduled") > now);
            unregister_runtime(key);
        }

        #[tokio::test]
        async fn overlapping_fire_is_refused() {
            let (scheduler, _store, key) = scheduler_fixture();
            assert!(scheduler.try_begin_run("sync_Demo_Co"));
            // The first run is still active, so the second fire must be
            // skipped rather than queued.
            assert!(!scheduler.try_begin_run("sync_Demo_Co"));
            Scheduler::finish_run(&scheduler.running, "sync_Demo_Co");
            assert!(scheduler.try_begin_run("sync_Demo_Co"));
            unregister_runtime(key);
        }

        #[tokio::test]
        async fn misfired_job_is_dropped_but_rescheduled() {
            let (scheduler, store, key) = scheduler_fixture();
            let job = scheduler
                .add_or_update_job("Demo Co", JobTrigger::Interval { minutes: 60 }, true)
                .await
                .expect("job saved");

            // Ten minutes late: beyond the grace, less than one period.
            let now = Utc::now();
            store
                .update_fire_times(
                    &job.job_id,
                    Some(now - chrono::Duration::minutes(10)),
                    None,
                )
                .await
                .expect("force misfire");

            scheduler.tick(now).await;

            let jobs = store.load_jobs().await.expect("load");
            assert_eq!(jobs[0].last_fire_at, None);
            assert!(jobs[0].next_fire_at.expect("rescheduled") > now);
            unregister_runtime(key);
        }

        #[tokio::test]
        async fn disabled_jobs_never_fire() {
            let (scheduler, store, key) = scheduler_fixture();
            scheduler
                .add_or_update_job("Demo Co", JobTrigger::Interval { minutes: 60 }, false)
                .await
                .expect("job saved");

            scheduler.tick(Utc::now()).await;
            let jobs = store.load_jobs().await.expect("load");
            assert_eq!(jobs[0].next_fire_at, None);
            assert_eq!(jobs[0].last_fire_at, None);
            unregister_runtime(key);
        }
    }
}
