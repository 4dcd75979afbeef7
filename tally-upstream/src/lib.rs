#![deny(clippy::print_stdout, clippy::print_stderr)]

//! HTTP client for the upstream accounting application.
//!
//! The upstream's only interface is a single HTTP endpoint accepting XML
//! request documents. This crate owns request templating, response
//! sanitization and the retry/timeout policy; parsers live in
//! `tally-ingest` and receive the sanitized text this client produces.

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::NaiveDate;
use regex_lite::Regex;
use tally_ingest::CompanyRecord;
use tally_ingest::VoucherKind;
use tally_ingest::parse_companies;
use thiserror::Error;
use tracing::debug;
use tracing::info;
use tracing::warn;

mod sanitize;
mod template;

pub use sanitize::sanitize_response;
pub use sanitize::sanitize_text;

use template::TemplateStore;
use template::render_request;

pub type UpstreamResult<T> = Result<T, UpstreamError>;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("upstream returned status {0}")]
    UpstreamStatus(u16),
    #[error("request template missing: {0}")]
    TemplateMissing(PathBuf),
    #[error("template error: {0}")]
    Template(String),
}

/// Connection policy for the shared client. Read timeouts are generous
/// because large snapshot responses take many minutes to stream.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub max_retries: u32,
    pub templates_dir: PathBuf,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9000,
            connect_timeout: Duration::from_secs(60),
            read_timeout: Duration::from_secs(1800),
            max_retries: 3,
            templates_dir: PathBuf::from("templates"),
        }
    }
}

impl UpstreamConfig {
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }
}

/// Shared per-process client. Workers clone the handle; the underlying
/// connection pool is owned by `reqwest`.
#[derive(Clone)]
pub struct TallyClient {
    http: reqwest::Client,
    endpoint: String,
    max_retries: u32,
    templates: std::sync::Arc<TemplateStore>,
}

impl TallyClient {
    pub fn new(config: &UpstreamConfig) -> UpstreamResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .pool_max_idle_per_host(20)
            .build()
            .map_err(|err| UpstreamError::Network(err.to_string()))?;
        info!("initializing upstream client for {}", config.endpoint());
        Ok(Self {
            http,
            endpoint: config.endpoint(),
            max_retries: config.max_retries,
            templates: std::sync::Arc::new(TemplateStore::new(&config.templates_dir)),
        })
    }

    /// Reachability probe: an empty POST that any live upstream answers.
    pub async fn probe(&self) -> UpstreamResult<()> {
        let response = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "text/xml; charset=utf-8")
            .send()
            .await
            .map_err(classify_send_error)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(UpstreamError::UpstreamStatus(response.status().as_u16()))
        }
    }

    pub async fn fetch_companies(&self) -> UpstreamResult<Vec<CompanyRecord>> {
        let template = self.templates.load("company.xml")?;
        let body = template.as_str().to_string();
        let xml = self.post_with_retry(body, "Companies").await?;
        Ok(parse_companies(&xml))
    }

    pub async fn fetch_ledgers(&self, company_name: &str) -> UpstreamResult<String> {
        self.fetch("ledger.xml", "Ledgers", company_name, None, None, None)
            .await
    }

    pub async fn fetch_ledgers_cdc(
        &self,
        company_name: &str,
        last_alter_id: i64,
    ) -> UpstreamResult<String> {
        self.fetch(
            "cdc/ledger.xml",
            "Ledgers CDC",
            company_name,
            None,
            None,
            Some(last_alter_id),
        )
        .await
    }

    pub async fn fetch_trial_balance(
        &self,
        company_name: &str,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> UpstreamResult<String> {
        self.fetch(
            "reports/tb.xml",
            "Trial Balance",
            company_name,
            Some(from_date),
            Some(to_date),
            None,
        )
        .await
    }

    /// Bounded historical fetch for one voucher kind.
    pub async fn fetch_snapshot(
        &self,
        kind: VoucherKind,
        company_name: &str,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> UpstreamResult<String> {
        self.fetch(
            snapshot_template(kind),
            kind.label(),
            company_name,
            Some(from_date),
            Some(to_date),
            None,
        )
        .await
    }

    /// Incremental fetch: only records with alter id above the watermark.
    pub async fn fetch_cdc(
        &self,
        kind: VoucherKind,
        company_name: &str,
        last_alter_id: i64,
    ) -> UpstreamResult<String> {
        self.fetch(
            cdc_template(kind),
            kind.label(),
            company_name,
            None,
            None,
            Some(last_alter_id),
        )
        .await
    }

    async fn fetch(
        &self,
        template_name: &str,
        data_type: &str,
        company_name: &str,
        from_date: Option<NaiveDate>,
        to_date: Option<NaiveDate>,
        last_alter_id: Option<i64>,
    ) -> UpstreamResult<String> {
        info!("fetching {data_type} for company: {company_name}");
        let template = self.templates.load(template_name)?;
        let body = render_request(&template, company_name, from_date, to_date, last_alter_id);
        if let Some(threshold) = last_alter_id {
            debug!("CDC mode, fetching records with AlterID > {threshold}");
        }

        let started = std::time::Instant::now();
        let xml = self.post_with_retry(body, data_type).await?;
        info!(
            "fetched {data_type} for {company_name} in {:.1}s",
            started.elapsed().as_secs_f64()
        );

        if let Some(threshold) = last_alter_id {
            check_cdc_filter(&xml, threshold);
        }
        Ok(xml)
    }

    async fn post_with_retry(&self, body: String, data_type: &str) -> UpstreamResult<String> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let result = self
                .http
                .post(&self.endpoint)
                .header(reqwest::header::CONTENT_TYPE, "text/xml; charset=utf-8")
                .body(body.clone())
                .send()
                .await;

            let retryable = match &result {
                Ok(response) => {
                    let status = response.status();
                    status.as_u16() == 429 || status.is_server_error()
                }
                Err(err) => err.is_connect(),
            };

            match result {
                Ok(response) if response.status().is_success() => {
                    let bytes = response
                        .bytes()
                        .await
                        .map_err(|err| UpstreamError::Network(err.to_string()))?;
                    return Ok(sanitize_response(&bytes));
                }
                Ok(response) if retryable && attempt <= self.max_retries => {
                    warn!(
                        "{data_type}: upstream status {}, retry {attempt}/{}",
                        response.status(),
                        self.max_retries
                    );
                }
                Ok(response) => {
                    return Err(UpstreamError::UpstreamStatus(response.status().as_u16()));
                }
                Err(err) if err.is_timeout() => return Err(UpstreamError::Timeout),
                Err(err) if retryable && attempt <= self.max_retries => {
                    warn!("{data_type}: connect error {err}, retry {attempt}/{}", self.max_retries);
                }
                Err(err) => return Err(UpstreamError::Network(err.to_string())),
            }

            let backoff = Duration::from_secs(1_u64 << (attempt - 1).min(6));
            tokio::time::sleep(backoff).await;
        }
    }
}

fn classify_send_error(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout
    } else {
        UpstreamError::Network(err.to_string())
    }
}

static ALTER_ID_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<ALTERID>\s*(\d+)\s*</ALTERID>").expect("static regex"));

/// Alter ids at or below the CDC threshold found in a response. The
/// upstream has been observed returning unfiltered data, so the caller
/// logs rather than fails.
#[must_use]
pub fn cdc_filter_violations(xml: &str, last_alter_id: i64) -> Vec<i64> {
    ALTER_ID_TAG
        .captures_iter(xml)
        .filter_map(|caps| caps.get(1))
        .filter_map(|group| group.as_str().parse::<i64>().ok())
        .filter(|&id| id <= last_alter_id)
        .collect()
}

fn check_cdc_filter(xml: &str, last_alter_id: i64) {
    let violations = cdc_filter_violations(xml, last_alter_id);
    if violations.is_empty() {
        debug!("CDC filter check passed (threshold {last_alter_id})");
    } else {
        warn!(
            "CDC filter probably broken: {} record(s) at or below AlterID {last_alter_id}",
            violations.len()
        );
    }
}

/// Template asset for a kind's bounded snapshot request.
fn snapshot_template(kind: VoucherKind) -> &'static str {
    match kind {
        VoucherKind::Sales => "sales_vouchers.xml",
        VoucherKind::Purchase => "purchase_vouchers.xml",
        VoucherKind::CreditNote => "credit_note.xml",
        VoucherKind::DebitNote => "debit_note.xml",
        VoucherKind::Receipt => "receipt_vouchers.xml",
        VoucherKind::Payment => "payment_vouchers.xml",
        VoucherKind::Journal => "journal_vouchers.xml",
        VoucherKind::Contra => "contra_vouchers.xml",
    }
}

/// Template asset for a kind's CDC request.
fn cdc_template(kind: VoucherKind) -> &'static str {
    match kind {
        VoucherKind::Sales => "cdc/sales_cdc.xml",
        VoucherKind::Purchase => "cdc/purchase_cdc.xml",
        VoucherKind::CreditNote => "cdc/credit_cdc.xml",
        VoucherKind::DebitNote => "cdc/debit_cdc.xml",
        VoucherKind::Receipt => "cdc/receipt_cdc.xml",
        VoucherKind::Payment => "cdc/payment_cdc.xml",
        VoucherKind::Journal => "cdc/journal_cdc.xml",
        VoucherKind::Contra => "cdc/contra_cdc.xml",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;
    use wiremock::matchers::body_string_contains;
    use wiremock::matchers::method;

    fn config_for(server: &MockServer, templates_dir: &std::path::Path) -> UpstreamConfig {
        let address = server.address();
        UpstreamConfig {
            host: address.ip().to_string(),
            port: address.port(),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            max_retries: 2,
            templates_dir: templates_dir.to_path_buf(),
        }
    }

    fn write_template(dir: &std::path::Path, relative: &str, body: &str) {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("template dir");
        }
        std::fs::write(path, body).expect("template file");
    }

    const SNAPSHOT_TEMPLATE: &str = "<ENVELOPE><SVCURRENTCOMPANY></SVCURRENTCOMPANY>\
        <SVFROMDATE></SVFROMDATE><SVTODATE></SVTODATE>PLACEHOLDER_ALTER_ID</ENVELOPE>";

    #[tokio::test]
    async fn snapshot_fetch_substitutes_and_sanitizes() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().expect("tempdir");
        write_template(dir.path(), "sales_vouchers.xml", SNAPSHOT_TEMPLATE);

        Mock::given(method("POST"))
            .and(body_string_contains("<SVCURRENTCOMPANY>Demo Co</SVCURRENTCOMPANY>"))
            .and(body_string_contains("<SVFROMDATE>20240401</SVFROMDATE>"))
            .and(body_string_contains("$$Number:$AlterID > 0"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"<ENVELOPE>Tata & Sons</ENVELOPE>".to_vec()),
            )
            .mount(&server)
            .await;

        let client = TallyClient::new(&config_for(&server, dir.path())).expect("client");
        let xml = client
            .fetch_snapshot(
                VoucherKind::Sales,
                "Demo Co",
                NaiveDate::from_ymd_opt(2024, 4, 1).expect("date"),
                NaiveDate::from_ymd_opt(2024, 6, 30).expect("date"),
            )
            .await
            .expect("snapshot fetch");
        assert_eq!(xml, "<ENVELOPE>Tata &amp; Sons</ENVELOPE>");
    }

    #[tokio::test]
    async fn server_errors_retry_then_succeed() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().expect("tempdir");
        write_template(dir.path(), "cdc/sales_cdc.xml", SNAPSHOT_TEMPLATE);

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<ENVELOPE></ENVELOPE>"))
            .mount(&server)
            .await;

        let client = TallyClient::new(&config_for(&server, dir.path())).expect("client");
        let xml = client
            .fetch_cdc(VoucherKind::Sales, "Demo Co", 500)
            .await
            .expect("retried fetch");
        assert_eq!(xml, "<ENVELOPE></ENVELOPE>");
    }

    #[tokio::test]
    async fn client_errors_do_not_retry() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().expect("tempdir");
        write_template(dir.path(), "ledger.xml", SNAPSHOT_TEMPLATE);

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = TallyClient::new(&config_for(&server, dir.path())).expect("client");
        let err = client.fetch_ledgers("Demo Co").await.expect_err("404");
        assert!(matches!(err, UpstreamError::UpstreamStatus(404)));
    }

    #[tokio::test]
    async fn missing_template_fails_before_any_request() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let client = TallyClient::new(&config_for(&server, dir.path())).expect("client");
        let err = client.fetch_ledgers("Demo Co").await.expect_err("missing");
        assert!(matches!(err, UpstreamError::TemplateMissing(_)));
    }

    #[test]
    fn cdc_violations_find_stale_alter_ids() {
        let xml = "<E><V><ALTERID>400</ALTERID></V><V><ALTERID>501</ALTERID></V>\
                   <V><ALTERID>500</ALTERID></V></E>";
        assert_eq!(cdc_filter_violations(xml, 500), vec![400, 500]);
        assert!(cdc_filter_violations(xml, 399).is_empty());
    }
}
