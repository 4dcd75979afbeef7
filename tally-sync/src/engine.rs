//! Per-tenant sync orchestration.
//!
//! A run syncs masters and the trial balance first, then fans the eight
//! voucher kinds out over a bounded worker pool. Each kind runs its own
//! state machine: one CDC fetch once the initial snapshot is done,
//! otherwise the month-chunked snapshot loop with per-chunk commit.

use std::sync::Arc;

use chrono::NaiveDate;
use tally_ingest::VoucherKind;
use tally_ingest::parse_ledgers;
use tally_ingest::parse_trial_balance;
use tally_ingest::parse_vouchers;
use tally_warehouse::Warehouse;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::SyncError;
use crate::chunks::Chunk;
use crate::chunks::generate_chunks;
use crate::progress::LogLevel;
use crate::progress::NullSink;
use crate::progress::ProgressEvent;
use crate::progress::ProgressSink;
use crate::progress::SyncStatus;
use crate::upstream::Upstream;

/// Tuning knobs for a run. Chunk size and worker count are deployment
/// knobs, not constants; the fallback origin is a business-calendar
/// start that operators override per deployment.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub chunk_months: u32,
    pub voucher_workers: usize,
    pub fallback_from: NaiveDate,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_months: 3,
            voucher_workers: 8,
            fallback_from: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap_or(NaiveDate::MIN),
        }
    }
}

/// Outcome of one snapshot chunk, consumed by the snapshot loop.
#[derive(Debug)]
pub enum ChunkOutcome {
    Committed { max_alter_id: i64, rows: u64 },
    Empty,
    Failed(SyncError),
}

/// Outcome of one voucher kind within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindOutcome {
    Completed { rows: u64 },
    NoChanges,
    Failed(String),
    Cancelled,
}

impl KindOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, KindOutcome::Completed { .. } | KindOutcome::NoChanges)
    }
}

/// Per-tenant run result. Kind failures are isolated; the report keeps
/// them all so the caller can decide the process exit code.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub company_name: String,
    pub reachable: bool,
    pub kinds: Vec<(VoucherKind, KindOutcome)>,
}

impl RunReport {
    #[must_use]
    pub fn success(&self) -> bool {
        self.reachable
            && self.kinds.len() == VoucherKind::ALL.len()
            && self.kinds.iter().all(|(_, outcome)| outcome.is_success())
    }

    /// 0 = all kinds succeeded, 1 = any kind failed, 2 = tenant not
    /// reachable at all.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if !self.reachable {
            2
        } else if self.success() {
            0
        } else {
            1
        }
    }
}

#[derive(Clone)]
pub struct SyncEngine {
    upstream: Arc<dyn Upstream>,
    warehouse: Arc<dyn Warehouse>,
    sink: Arc<dyn ProgressSink>,
    config: SyncConfig,
    cancel: CancellationToken,
}

impl SyncEngine {
    #[must_use]
    pub fn new(
        upstream: Arc<dyn Upstream>,
        warehouse: Arc<dyn Warehouse>,
        config: SyncConfig,
    ) -> Self {
        Self::with_sink(upstream, warehouse, config, Arc::new(NullSink))
    }

    #[must_use]
    pub fn with_sink(
        upstream: Arc<dyn Upstream>,
        warehouse: Arc<dyn Warehouse>,
        config: SyncConfig,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            upstream,
            warehouse,
            sink,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Cooperative cancel flag, checked between chunks and kinds. A
    /// cancelled run leaves the watermark at the last committed chunk.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn log(&self, company: &str, level: LogLevel, message: impl Into<String>) {
        self.sink.emit(ProgressEvent::Log {
            company: company.to_string(),
            level,
            message: message.into(),
        });
    }

    /// Sync one tenant. Kind failures are reported, never propagated; a
    /// dead upstream short-circuits into an unreachable report.
    pub async fn run_company(
        &self,
        company_name: &str,
        to_date: NaiveDate,
        manual_from_date: Option<NaiveDate>,
    ) -> RunReport {
        let company_name = company_name.trim().to_string();
        self.sink.emit(ProgressEvent::Status {
            company: company_name.clone(),
            status: SyncStatus::Syncing,
        });
        self.sink.emit(ProgressEvent::Progress {
            company: company_name.clone(),
            pct: 0.0,
            label: "connecting to upstream".to_string(),
        });

        if let Err(err) = self.upstream.probe().await {
            error!("[{company_name}] upstream not reachable: {err}");
            self.log(
                &company_name,
                LogLevel::Error,
                format!("upstream not reachable: {err}"),
            );
            self.sink.emit(ProgressEvent::Status {
                company: company_name.clone(),
                status: SyncStatus::SyncError,
            });
            self.sink.emit(ProgressEvent::Done {
                company: company_name.clone(),
                success: false,
            });
            return RunReport {
                company_name,
                reachable: false,
                kinds: Vec::new(),
            };
        }

        let from_date = self.resolve_from_date(&company_name, manual_from_date).await;
        info!(
            "[{company_name}] starting sync | {from_date} -> {to_date} | \
             chunk={}mo workers={}",
            self.config.chunk_months, self.config.voucher_workers
        );

        self.sync_ledgers(&company_name).await;
        self.sync_trial_balance(&company_name, from_date, to_date).await;

        let semaphore = Arc::new(Semaphore::new(self.config.voucher_workers.max(1)));
        let mut tasks = JoinSet::new();
        for kind in VoucherKind::ALL {
            let engine = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let company = company_name.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = engine.sync_kind(&company, kind, from_date, to_date).await;
                (kind, outcome)
            });
        }

        let total = VoucherKind::ALL.len();
        let mut kinds: Vec<(VoucherKind, KindOutcome)> = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((kind, outcome)) => {
                    self.sink.emit(ProgressEvent::Progress {
                        company: company_name.clone(),
                        pct: (kinds.len() + 1) as f32 / total as f32 * 100.0,
                        label: format!("{} finished", kind.label()),
                    });
                    kinds.push((kind, outcome));
                }
                Err(err) => {
                    error!("[{company_name}] voucher task aborted: {err}");
                }
            }
        }
        kinds.sort_by_key(|(kind, _)| {
            VoucherKind::ALL
                .iter()
                .position(|candidate| candidate == kind)
        });

        let report = RunReport {
            company_name: company_name.clone(),
            reachable: true,
            kinds,
        };
        let success = report.success();
        self.sink.emit(ProgressEvent::Status {
            company: company_name.clone(),
            status: if success {
                SyncStatus::Synced
            } else {
                SyncStatus::SyncError
            },
        });
        self.sink.emit(ProgressEvent::Done {
            company: company_name,
            success,
        });
        report
    }

    /// Sequentially sync every active tenant with a usable name.
    pub async fn run_all(
        &self,
        to_date: NaiveDate,
        manual_from_date: Option<NaiveDate>,
    ) -> Vec<RunReport> {
        let companies = match self.warehouse.list_companies().await {
            Ok(companies) => companies,
            Err(err) => {
                error!("failed to list companies: {err}");
                return Vec::new();
            }
        };
        let valid: Vec<String> = companies
            .into_iter()
            .filter(|company| company.is_active)
            .map(|company| company.name.trim().to_string())
            .filter(|name| {
                !name.is_empty() && !matches!(name.to_uppercase().as_str(), "N/A" | "NA" | "NONE")
            })
            .collect();
        info!("syncing {} companies", valid.len());

        let mut reports = Vec::with_capacity(valid.len());
        for name in valid {
            if self.cancel.is_cancelled() {
                break;
            }
            reports.push(self.run_company(&name, to_date, manual_from_date).await);
        }
        self.sink.emit(ProgressEvent::AllDone);
        reports
    }

    async fn resolve_from_date(
        &self,
        company_name: &str,
        manual_from_date: Option<NaiveDate>,
    ) -> NaiveDate {
        if let Some(manual) = manual_from_date {
            return manual;
        }
        let stored = self
            .warehouse
            .get_company(company_name)
            .await
            .ok()
            .flatten()
            .and_then(|company| company.starting_from);
        match stored {
            Some(starting_from) => starting_from,
            None => {
                warn!(
                    "[{company_name}] no valid starting_from, falling back to {}",
                    self.config.fallback_from
                );
                self.config.fallback_from
            }
        }
    }

    /// Ledger masters are fetched whole; a failure is logged and never
    /// aborts the run.
    async fn sync_ledgers(&self, company_name: &str) {
        info!("[{company_name}] syncing ledgers");
        let xml = match self.upstream.fetch_ledgers(company_name).await {
            Ok(xml) => xml,
            Err(err) => {
                error!("[{company_name}] failed to fetch ledgers: {err}");
                self.log(company_name, LogLevel::Error, format!("ledgers failed: {err}"));
                return;
            }
        };
        let rows = parse_ledgers(&xml, company_name);
        if rows.is_empty() {
            warn!("[{company_name}] no ledger rows parsed");
            return;
        }
        let max_alter_id = rows.iter().map(|row| row.alter_id).max().unwrap_or(0);
        match self.warehouse.upsert_ledgers(&rows).await {
            Ok(_) => {
                if let Err(err) = self
                    .warehouse
                    .update_watermark(company_name, "ledger", max_alter_id, false)
                    .await
                {
                    error!("[{company_name}] ledger watermark update failed: {err}");
                }
                info!(
                    "[{company_name}] ledgers done | rows={} | max_alter_id={max_alter_id}",
                    rows.len()
                );
            }
            Err(err) => {
                error!("[{company_name}] ledger upsert failed: {err}");
                self.log(company_name, LogLevel::Error, format!("ledgers failed: {err}"));
            }
        }
    }

    async fn sync_trial_balance(
        &self,
        company_name: &str,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) {
        info!("[{company_name}] syncing trial balance | {from_date} -> {to_date}");
        let xml = match self
            .upstream
            .fetch_trial_balance(company_name, from_date, to_date)
            .await
        {
            Ok(xml) => xml,
            Err(err) => {
                error!("[{company_name}] failed to fetch trial balance: {err}");
                self.log(
                    company_name,
                    LogLevel::Error,
                    format!("trial balance failed: {err}"),
                );
                return;
            }
        };
        let rows = parse_trial_balance(&xml, company_name, from_date, to_date);
        if rows.is_empty() {
            warn!("[{company_name}] no trial balance rows parsed");
            return;
        }
        let max_alter_id = rows.iter().map(|row| row.alter_id).max().unwrap_or(0);
        match self.warehouse.upsert_trial_balance(&rows).await {
            Ok(_) => {
                if let Err(err) = self
                    .warehouse
                    .update_watermark(company_name, "trial_balance", max_alter_id, false)
                    .await
                {
                    error!("[{company_name}] trial balance watermark update failed: {err}");
                }
                info!(
                    "[{company_name}] trial balance done | rows={} | max_alter_id={max_alter_id}",
                    rows.len()
                );
            }
            Err(err) => {
                error!("[{company_name}] trial balance upsert failed: {err}");
            }
        }
    }

    /// Per-kind state machine: CDC once when the initial snapshot has
    /// completed, otherwise the resumable chunk loop.
    async fn sync_kind(
        &self,
        company_name: &str,
        kind: VoucherKind,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> KindOutcome {
        if self.cancel.is_cancelled() {
            return KindOutcome::Cancelled;
        }
        info!("[{company_name}] [{kind}] starting");

        let state = match self.warehouse.sync_state(company_name, kind.key()).await {
            Ok(state) => state,
            Err(err) => return self.fail_kind(company_name, kind, err.to_string()),
        };
        let is_initial_done = state.as_ref().is_some_and(|state| state.is_initial_done);
        let last_alter_id = state.as_ref().map_or(0, |state| state.last_alter_id);
        let last_synced_month = state.and_then(|state| state.last_synced_month);

        if is_initial_done {
            self.sync_kind_cdc(company_name, kind, last_alter_id).await
        } else {
            self.sync_kind_snapshot(company_name, kind, from_date, to_date, last_synced_month)
                .await
        }
    }

    async fn sync_kind_cdc(
        &self,
        company_name: &str,
        kind: VoucherKind,
        last_alter_id: i64,
    ) -> KindOutcome {
        info!("[{company_name}] [{kind}] CDC | last_alter_id={last_alter_id}");
        let xml = match self
            .upstream
            .fetch_cdc(kind, company_name, last_alter_id)
            .await
        {
            Ok(xml) => xml,
            Err(err) => return self.fail_kind(company_name, kind, err.to_string()),
        };

        let rows = parse_vouchers(kind, &xml, company_name);
        if rows.is_empty() {
            info!("[{company_name}] [{kind}] no new/changed records (CDC)");
            self.log(
                company_name,
                LogLevel::Info,
                format!("{}: no new/changed records", kind.label()),
            );
            return KindOutcome::NoChanges;
        }

        let written = match self.warehouse.upsert_vouchers(kind, &rows).await {
            Ok(written) => written,
            Err(err) => return self.fail_kind(company_name, kind, err.to_string()),
        };
        let max_alter_id = rows.max_alter_id();
        if let Err(err) = self
            .warehouse
            .update_watermark(company_name, kind.key(), max_alter_id, true)
            .await
        {
            return self.fail_kind(company_name, kind, err.to_string());
        }
        info!(
            "[{company_name}] [{kind}] CDC done | rows={} | max_alter_id={max_alter_id}",
            rows.len()
        );
        KindOutcome::Completed { rows: written }
    }

    async fn sync_kind_snapshot(
        &self,
        company_name: &str,
        kind: VoucherKind,
        from_date: NaiveDate,
        to_date: NaiveDate,
        last_synced_month: Option<String>,
    ) -> KindOutcome {
        info!(
            "[{company_name}] [{kind}] initial snapshot ({}-month chunks) | \
             {from_date} -> {to_date}",
            self.config.chunk_months
        );

        let mut max_alter_id = 0_i64;
        let mut total_rows = 0_u64;
        let mut chunks_done = 0_usize;

        for chunk in generate_chunks(from_date, to_date, self.config.chunk_months) {
            if self.cancel.is_cancelled() {
                info!("[{company_name}] [{kind}] cancelled between chunks");
                return KindOutcome::Cancelled;
            }
            // Resume after a crash: everything up to the recorded month
            // is already committed.
            if last_synced_month
                .as_deref()
                .is_some_and(|done| chunk.month.as_str() <= done)
            {
                continue;
            }

            match self.run_chunk(company_name, kind, &chunk).await {
                ChunkOutcome::Committed {
                    max_alter_id: chunk_max,
                    rows,
                } => {
                    max_alter_id = max_alter_id.max(chunk_max);
                    total_rows += rows;
                    chunks_done += 1;
                }
                ChunkOutcome::Empty => {
                    // Advance anyway so genuinely empty months do not
                    // stall the loop.
                    info!(
                        "[{company_name}] [{kind}] chunk {} empty, advancing",
                        chunk.month
                    );
                    if let Err(err) = self
                        .warehouse
                        .advance_month(company_name, kind.key(), &chunk.month)
                        .await
                    {
                        return self.fail_kind(company_name, kind, err.to_string());
                    }
                    chunks_done += 1;
                }
                ChunkOutcome::Failed(err) => {
                    error!(
                        "[{company_name}] [{kind}] sync failed, will resume from last \
                         committed chunk on next run: {err}"
                    );
                    return self.fail_kind(company_name, kind, err.to_string());
                }
            }
        }

        let final_month = to_date.format("%Y%m").to_string();
        if let Err(err) = self
            .warehouse
            .mark_initial_done(company_name, kind.key(), max_alter_id, &final_month)
            .await
        {
            return self.fail_kind(company_name, kind, err.to_string());
        }
        info!(
            "[{company_name}] [{kind}] initial snapshot complete | chunks={chunks_done} | \
             total_rows={total_rows} | max_alter_id={max_alter_id}"
        );
        KindOutcome::Completed { rows: total_rows }
    }

    async fn run_chunk(
        &self,
        company_name: &str,
        kind: VoucherKind,
        chunk: &Chunk,
    ) -> ChunkOutcome {
        info!(
            "[{company_name}] [{kind}] chunk {} | {} -> {}",
            chunk.month, chunk.from, chunk.to
        );
        let xml = match self
            .upstream
            .fetch_snapshot(kind, company_name, chunk.from, chunk.to)
            .await
        {
            Ok(xml) => xml,
            Err(err) => return ChunkOutcome::Failed(err.into()),
        };
        let rows = parse_vouchers(kind, &xml, company_name);
        if rows.is_empty() {
            return ChunkOutcome::Empty;
        }
        match self
            .warehouse
            .upsert_vouchers_and_advance_month(kind, &rows, company_name, &chunk.month)
            .await
        {
            Ok(_) => ChunkOutcome::Committed {
                max_alter_id: rows.max_alter_id(),
                rows: rows.len() as u64,
            },
            Err(err) => ChunkOutcome::Failed(err.into()),
        }
    }

    fn fail_kind(&self, company_name: &str, kind: VoucherKind, message: String) -> KindOutcome {
        error!("[{company_name}] [{kind}] failed: {message}");
        self.log(
            company_name,
            LogLevel::Error,
            format!("{}: {message}", kind.label()),
        );
        self.sink.emit(ProgressEvent::Status {
            company: company_name.to_string(),
            status: SyncStatus::SyncError,
        });
        KindOutcome::Failed(message)
    }
}
