//! Request template store.
//!
//! Each upstream operation owns an XML request template on disk. The
//! templates are opaque assets: the store caches them once per process
//! and per call substitutes the current-company and date anchors plus
//! the literal `PLACEHOLDER_ALTER_ID` filter expression.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::RwLock;

use chrono::NaiveDate;
use tracing::debug;

use crate::UpstreamError;
use crate::UpstreamResult;

pub(crate) const ALTER_ID_PLACEHOLDER: &str = "PLACEHOLDER_ALTER_ID";

pub(crate) struct TemplateStore {
    dir: PathBuf,
    cache: RwLock<HashMap<String, Arc<String>>>,
}

impl TemplateStore {
    pub(crate) fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Load a template relative to the templates directory, caching the
    /// raw text for the lifetime of the process.
    pub(crate) fn load(&self, relative: &str) -> UpstreamResult<Arc<String>> {
        if let Some(cached) = self
            .cache
            .read()
            .ok()
            .and_then(|cache| cache.get(relative).cloned())
        {
            return Ok(cached);
        }

        let path = self.dir.join(relative);
        let text = read_template(&path)?;
        let text = Arc::new(text);
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(relative.to_string(), Arc::clone(&text));
            debug!("cached request template {relative}");
        }
        Ok(text)
    }
}

fn read_template(path: &Path) -> UpstreamResult<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(UpstreamError::TemplateMissing(path.to_path_buf()))
        }
        Err(err) => Err(UpstreamError::Template(format!(
            "failed to read {}: {err}",
            path.display()
        ))),
    }
}

/// Render one request from a cached template. Dates are substituted only
/// when provided (CDC requests carry none); the alter-id placeholder is
/// always replaced because the upstream evaluates the expression.
pub(crate) fn render_request(
    template: &str,
    company_name: &str,
    from_date: Option<NaiveDate>,
    to_date: Option<NaiveDate>,
    last_alter_id: Option<i64>,
) -> String {
    let mut body = set_element_text(template, "SVCURRENTCOMPANY", &escape_text(company_name));
    if let Some(from) = from_date {
        body = set_element_text(&body, "SVFROMDATE", &from.format("%Y%m%d").to_string());
    }
    if let Some(to) = to_date {
        body = set_element_text(&body, "SVTODATE", &to.format("%Y%m%d").to_string());
    }
    let threshold = last_alter_id.unwrap_or(0);
    body.replace(
        ALTER_ID_PLACEHOLDER,
        &format!("$$Number:$AlterID > {threshold}"),
    )
}

/// Replace the text of every `<tag>...</tag>` occurrence. Templates use
/// plain element anchors, so a targeted splice beats a full XML pass.
fn set_element_text(xml: &str, tag: &str, value: &str) -> String {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut out = String::with_capacity(xml.len());
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let after_open = start + open.len();
        let Some(end) = rest[after_open..].find(&close) else {
            break;
        };
        out.push_str(&rest[..after_open]);
        out.push_str(value);
        rest = &rest[after_open + end..];
    }
    out.push_str(rest);
    out
}

fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const TEMPLATE: &str = "<ENVELOPE><BODY><DESC><STATICVARIABLES>\
        <SVCURRENTCOMPANY></SVCURRENTCOMPANY>\
        <SVFROMDATE></SVFROMDATE><SVTODATE></SVTODATE>\
        </STATICVARIABLES>\
        <TDL><SYSTEM NAME=\"FilterByAlterID\">PLACEHOLDER_ALTER_ID</SYSTEM></TDL>\
        </DESC></BODY></ENVELOPE>";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("date")
    }

    #[test]
    fn substitutes_company_dates_and_filter() {
        let body = render_request(
            TEMPLATE,
            "Demo & Co",
            Some(date(2024, 4, 1)),
            Some(date(2024, 6, 30)),
            Some(500),
        );
        assert!(body.contains("<SVCURRENTCOMPANY>Demo &amp; Co</SVCURRENTCOMPANY>"));
        assert!(body.contains("<SVFROMDATE>20240401</SVFROMDATE>"));
        assert!(body.contains("<SVTODATE>20240630</SVTODATE>"));
        assert!(body.contains("$$Number:$AlterID > 500"));
        assert!(!body.contains(ALTER_ID_PLACEHOLDER));
    }

    #[test]
    fn missing_alter_id_means_full_fetch() {
        let body = render_request(TEMPLATE, "Demo Co", None, None, None);
        assert!(body.contains("$$Number:$AlterID > 0"));
        // Date anchors stay empty when no range is requested.
        assert!(body.contains("<SVFROMDATE></SVFROMDATE>"));
    }

    #[test]
    fn store_caches_first_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger.xml");
        std::fs::write(&path, "<A><SVCURRENTCOMPANY></SVCURRENTCOMPANY></A>").expect("write");

        let store = TemplateStore::new(dir.path());
        let first = store.load("ledger.xml").expect("first load");

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .expect("reopen");
        file.write_all(b"<CHANGED/>").expect("overwrite");

        let second = store.load("ledger.xml").expect("second load");
        assert_eq!(first.as_str(), second.as_str());
    }

    #[test]
    fn missing_template_is_a_distinct_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = TemplateStore::new(dir.path());
        let err = store.load("absent.xml").expect_err("must fail");
        assert!(matches!(err, UpstreamError::TemplateMissing(_)));
    }
}
