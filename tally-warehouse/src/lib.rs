#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Warehouse writer and watermark store.
//!
//! The orchestrator only sees the [`Warehouse`] trait. The SQL
//! implementation writes to MySQL through a shared pool; the in-memory
//! implementation backs orchestrator and property tests with the same
//! observable semantics.

use async_trait::async_trait;
use chrono::DateTime;
use chrono::NaiveDate;
use chrono::Utc;
use tally_ingest::CompanyRecord;
use tally_ingest::LedgerRow;
use tally_ingest::TrialBalanceRow;
use tally_ingest::VoucherKind;
use tally_ingest::VoucherRows;
use thiserror::Error;

mod memory;
mod schema;
mod sql;

pub use memory::InMemoryWarehouse;
pub use sql::SqlWarehouse;
pub use sql::WarehouseConfig;

pub type WarehouseResult<T> = Result<T, WarehouseError>;

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("validation error: {0}")]
    Validation(String),
}

impl From<sqlx::Error> for WarehouseError {
    fn from(err: sqlx::Error) -> Self {
        WarehouseError::Storage(err.to_string())
    }
}

/// Durable per-(company, voucher kind) sync watermark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    pub company_name: String,
    pub voucher_type: String,
    pub last_alter_id: i64,
    pub is_initial_done: bool,
    pub last_synced_month: Option<String>,
    pub last_sync_time: Option<DateTime<Utc>>,
}

impl SyncState {
    #[must_use]
    pub fn new(company_name: impl Into<String>, voucher_type: impl Into<String>) -> Self {
        Self {
            company_name: company_name.into(),
            voucher_type: voucher_type.into(),
            last_alter_id: 0,
            is_initial_done: false,
            last_synced_month: None,
            last_sync_time: None,
        }
    }
}

/// A configured tenant: the upstream company record plus local overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredCompany {
    pub guid: String,
    pub name: String,
    pub formal_name: String,
    pub company_number: String,
    pub starting_from: Option<NaiveDate>,
    pub books_from: Option<NaiveDate>,
    pub audited_upto: Option<NaiveDate>,
    pub tally_host: Option<String>,
    pub tally_port: Option<u16>,
    pub is_active: bool,
}

impl StoredCompany {
    #[must_use]
    pub fn from_record(record: CompanyRecord) -> Self {
        Self {
            guid: record.guid,
            name: record.name,
            formal_name: record.formal_name,
            company_number: record.company_number,
            starting_from: record.starting_from,
            books_from: record.books_from,
            audited_upto: record.audited_upto,
            tally_host: None,
            tally_port: None,
            is_active: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompanyImportStats {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    // Tenant registry. Companies are never deleted, only flagged
    // inactive.
    async fn import_companies(
        &self,
        records: Vec<CompanyRecord>,
    ) -> WarehouseResult<CompanyImportStats>;
    async fn list_companies(&self) -> WarehouseResult<Vec<StoredCompany>>;
    async fn get_company(&self, name: &str) -> WarehouseResult<Option<StoredCompany>>;

    // Masters and balances, fetched without chunking.
    async fn upsert_ledgers(&self, rows: &[LedgerRow]) -> WarehouseResult<u64>;
    async fn upsert_trial_balance(&self, rows: &[TrialBalanceRow]) -> WarehouseResult<u64>;

    /// Idempotent voucher upsert: insert unseen guids, replace a guid's
    /// rows when the incoming alter id is strictly newer, fan a stub
    /// row's soft delete out over every stored row of that guid, and
    /// ignore everything else.
    async fn upsert_vouchers(&self, kind: VoucherKind, rows: &VoucherRows)
    -> WarehouseResult<u64>;

    /// Same as [`Warehouse::upsert_vouchers`] but commits the chunk-month
    /// watermark in the same transaction, which is what makes snapshot
    /// chunks resumable.
    async fn upsert_vouchers_and_advance_month(
        &self,
        kind: VoucherKind,
        rows: &VoucherRows,
        company_name: &str,
        month: &str,
    ) -> WarehouseResult<u64>;

    // Watermarks.
    async fn sync_state(
        &self,
        company_name: &str,
        kind: &str,
    ) -> WarehouseResult<Option<SyncState>>;

    /// Monotonic watermark update: `last_alter_id` never decreases and
    /// `is_initial_done` never regresses to false.
    async fn update_watermark(
        &self,
        company_name: &str,
        kind: &str,
        alter_id: i64,
        initial_done: bool,
    ) -> WarehouseResult<()>;

    /// Record the last fully-committed chunk month of a running snapshot.
    async fn advance_month(
        &self,
        company_name: &str,
        kind: &str,
        month: &str,
    ) -> WarehouseResult<()>;

    /// Latch the initial-done flag together with the terminal alter id
    /// and month, in one mutation.
    async fn mark_initial_done(
        &self,
        company_name: &str,
        kind: &str,
        final_alter_id: i64,
        final_month: &str,
    ) -> WarehouseResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stored_company_defaults_to_active_without_overrides() {
        let company = StoredCompany::from_record(CompanyRecord {
            guid: "co-1".into(),
            name: "Demo Co".into(),
            ..CompanyRecord::default()
        });
        assert!(company.is_active);
        assert_eq!(company.tally_host, None);
        assert_eq!(company.tally_port, None);
    }

    #[test]
    fn fresh_sync_state_is_a_cold_start() {
        let state = SyncState::new("Demo Co", "sales");
        assert_eq!(state.last_alter_id, 0);
        assert!(!state.is_initial_done);
        assert_eq!(state.last_synced_month, None);
    }
}
