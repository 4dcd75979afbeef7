//! Text and number recovery helpers shared by the parser families.
//!
//! Upstream free-form fields mix escaped line breaks, localized amount
//! formats and trailing unit suffixes; these helpers normalize them
//! before any typed interpretation happens.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex_lite::Regex;

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));
static FINAL_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"=\s*[?]?\s*-?(\d+\.?\d*)").expect("static regex"));
static FIRST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?(\d+\.?\d*)").expect("static regex"));
static SIGNED_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(-?)(\d+\.?\d*)").expect("static regex"));
static UNIT_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\s*(\w+)\s*$").expect("static regex"));
static QTY_WITH_UNIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*-?(\d+\.?\d*)\s*(\w*)").expect("static regex"));

/// Collapse escaped and literal line breaks into single spaces.
#[must_use]
pub fn clean_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let text = text
        .replace("&#13;&#10;", " ")
        .replace("&#13;", " ")
        .replace("&#10;", " ")
        .replace("\r\n", " ")
        .replace(['\r', '\n'], " ");
    WHITESPACE_RUN.replace_all(&text, " ").trim().to_string()
}

/// Recover the absolute numeric amount from a free-form amount field.
/// A `= ? NN` tail (the base-currency total) wins over the first number.
#[must_use]
pub fn numeric_amount(text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }
    let captured = FINAL_AMOUNT
        .captures(text)
        .or_else(|| FIRST_NUMBER.captures(text));
    captured
        .and_then(|caps| caps.get(1))
        .and_then(|group| group.as_str().parse::<f64>().ok())
        .map(f64::abs)
        .unwrap_or(0.0)
}

/// Whether the first number in the text carries a minus sign. The
/// upstream encodes the debit leg of an entry as a negative raw amount.
#[must_use]
pub fn first_number_is_negative(text: &str) -> bool {
    SIGNED_NUMBER
        .captures(text)
        .and_then(|caps| caps.get(1))
        .is_some_and(|sign| sign.as_str() == "-")
}

/// `YYYYMMDD` business dates; empty or malformed input maps to `None`,
/// never to an epoch default.
#[must_use]
pub fn parse_business_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(trimmed, "%Y%m%d").ok()
}

/// ISO rendering of a `YYYYMMDD` field, or empty when unparseable.
#[must_use]
pub fn format_business_date(text: &str) -> String {
    parse_business_date(text)
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Batch expiry strings arrive as `DD-Mon-YY` or `DD-Mon-YYYY`; anything
/// else is preserved verbatim for the operator to inspect.
#[must_use]
pub fn parse_expiry_date(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    for format in ["%d-%b-%y", "%d-%b-%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return date.format("%Y-%m-%d").to_string();
        }
    }
    trimmed.to_string()
}

/// Unit recovered from the trailing `/unit` of a rate field.
#[must_use]
pub fn extract_unit_from_rate(rate_text: &str) -> String {
    UNIT_SUFFIX
        .captures(rate_text)
        .and_then(|caps| caps.get(1))
        .map(|group| group.as_str().to_string())
        .unwrap_or_default()
}

/// Split `12.5 Box` style quantity fields into (quantity, unit).
#[must_use]
pub fn parse_quantity_with_unit(qty_text: &str) -> (f64, String) {
    let Some(caps) = QTY_WITH_UNIT.captures(qty_text.trim()) else {
        return (0.0, String::new());
    };
    let qty = caps
        .get(1)
        .and_then(|group| group.as_str().parse::<f64>().ok())
        .map(f64::abs)
        .unwrap_or(0.0);
    let unit = caps
        .get(2)
        .map(|group| group.as_str().to_string())
        .unwrap_or_default();
    (qty, unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn clean_text_collapses_breaks() {
        assert_eq!(clean_text("a&#13;&#10;b\r\nc\nd"), "a b c d");
        assert_eq!(clean_text("  spaced   out  "), "spaced out");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn numeric_amount_prefers_final_base_amount() {
        assert_eq!(numeric_amount("33.93 £ = ? 3568.76/Box"), 3568.76);
        assert_eq!(numeric_amount("-1234.50"), 1234.50);
        assert_eq!(numeric_amount("no numbers"), 0.0);
        assert_eq!(numeric_amount(""), 0.0);
    }

    #[test]
    fn sign_detection_reads_the_first_number() {
        assert!(first_number_is_negative("-500.00"));
        assert!(first_number_is_negative(" -33.93 £ = ? 3568.76"));
        assert!(!first_number_is_negative("500.00"));
        assert!(!first_number_is_negative(""));
    }

    #[test]
    fn business_dates_never_default_to_epoch() {
        assert_eq!(
            parse_business_date("20240415"),
            NaiveDate::from_ymd_opt(2024, 4, 15)
        );
        assert_eq!(parse_business_date(""), None);
        assert_eq!(parse_business_date("2024-04-15"), None);
        assert_eq!(format_business_date("20240401"), "2024-04-01");
        assert_eq!(format_business_date("garbage"), "");
    }

    #[test]
    fn expiry_dates_accept_two_and_four_digit_years() {
        assert_eq!(parse_expiry_date("31-Dec-25"), "2025-12-31");
        assert_eq!(parse_expiry_date("31-Dec-2025"), "2025-12-31");
        assert_eq!(parse_expiry_date("next year"), "next year");
        assert_eq!(parse_expiry_date(""), "");
    }

    #[test]
    fn units_come_from_rate_suffixes_and_quantities() {
        assert_eq!(extract_unit_from_rate("105.18/ Box"), "Box");
        assert_eq!(extract_unit_from_rate("105.18"), "");
        assert_eq!(parse_quantity_with_unit("12 Nos"), (12.0, "Nos".into()));
        assert_eq!(parse_quantity_with_unit("-3.5"), (3.5, String::new()));
        assert_eq!(parse_quantity_with_unit(""), (0.0, String::new()));
    }
}
