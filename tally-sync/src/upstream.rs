//! Seam between the engine and the HTTP client, so tests can run the
//! full state machine against a deterministic fake upstream.

use async_trait::async_trait;
use chrono::NaiveDate;
use tally_ingest::VoucherKind;
use tally_upstream::TallyClient;
use tally_upstream::UpstreamResult;

#[async_trait]
pub trait Upstream: Send + Sync {
    async fn probe(&self) -> UpstreamResult<()>;

    async fn fetch_ledgers(&self, company_name: &str) -> UpstreamResult<String>;

    async fn fetch_trial_balance(
        &self,
        company_name: &str,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> UpstreamResult<String>;

    async fn fetch_snapshot(
        &self,
        kind: VoucherKind,
        company_name: &str,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> UpstreamResult<String>;

    async fn fetch_cdc(
        &self,
        kind: VoucherKind,
        company_name: &str,
        last_alter_id: i64,
    ) -> UpstreamResult<String>;
}

#[async_trait]
impl Upstream for TallyClient {
    async fn probe(&self) -> UpstreamResult<()> {
        TallyClient::probe(self).await
    }

    async fn fetch_ledgers(&self, company_name: &str) -> UpstreamResult<String> {
        TallyClient::fetch_ledgers(self, company_name).await
    }

    async fn fetch_trial_balance(
        &self,
        company_name: &str,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> UpstreamResult<String> {
        TallyClient::fetch_trial_balance(self, company_name, from_date, to_date).await
    }

    async fn fetch_snapshot(
        &self,
        kind: VoucherKind,
        company_name: &str,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> UpstreamResult<String> {
        TallyClient::fetch_snapshot(self, kind, company_name, from_date, to_date).await
    }

    async fn fetch_cdc(
        &self,
        kind: VoucherKind,
        company_name: &str,
        last_alter_id: i64,
    ) -> UpstreamResult<String> {
        TallyClient::fetch_cdc(self, kind, company_name, last_alter_id).await
    }
}
