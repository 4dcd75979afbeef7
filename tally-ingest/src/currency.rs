//! Currency recovery from free-form upstream amount and rate fields.
//!
//! The upstream renders foreign amounts through a Windows code page and
//! regularly corrupts the currency symbol into `?` or U+FFFD mojibake, so
//! detection runs a prioritized pipeline: the corrupted-placeholder
//! pattern first (disambiguated by the exchange-rate band), then known
//! mojibake families, then the symbol/code table, then currency names.
//! The symbol table is data; operators extend it without touching the
//! matcher.

use std::sync::LazyLock;

use regex_lite::Regex;

use crate::text::numeric_amount;

pub struct CurrencySpec {
    pub code: &'static str,
    pattern: &'static str,
    names: &'static [&'static str],
}

/// Symbol/code patterns in priority order. Order matters: `$` resolves to
/// USD before the region-prefixed dollars get a chance, matching how the
/// upstream's own exports behave.
static CURRENCY_TABLE: &[CurrencySpec] = &[
    CurrencySpec { code: "USD", pattern: r"\$|US\$|USD", names: &["dollar", "dollars", "usd"] },
    CurrencySpec { code: "EUR", pattern: r"€|EUR|\?", names: &["euro", "euros", "eur"] },
    CurrencySpec { code: "GBP", pattern: "£|G£|GBP|\u{a3}|\u{fffd}", names: &["pound", "pounds", "sterling", "gbp"] },
    CurrencySpec { code: "JPY", pattern: r"¥|JPY", names: &["yen", "jpy"] },
    CurrencySpec { code: "CNY", pattern: r"CNY|RMB|元", names: &["yuan", "renminbi", "cny", "rmb"] },
    CurrencySpec { code: "INR", pattern: r"₹|₨|Rs\.?|INR", names: &["rupee", "rupees", "inr"] },
    CurrencySpec { code: "CHF", pattern: r"CHF|SFr\.?", names: &["franc", "francs", "chf", "swiss franc"] },
    CurrencySpec { code: "CAD", pattern: r"C\$|CA\$|CAD", names: &["canadian dollar", "cad"] },
    CurrencySpec { code: "AUD", pattern: r"A\$|AU\$|AUD", names: &["australian dollar", "aud"] },
    CurrencySpec { code: "NZD", pattern: r"NZ\$|NZD", names: &["new zealand dollar", "nzd"] },
    CurrencySpec { code: "KRW", pattern: r"₩|KRW", names: &["won", "krw"] },
    CurrencySpec { code: "SGD", pattern: r"S\$|SGD", names: &["singapore dollar", "sgd"] },
    CurrencySpec { code: "HKD", pattern: r"HK\$|HKD", names: &["hong kong dollar", "hkd"] },
    CurrencySpec { code: "NOK", pattern: r"NOK", names: &["norwegian krone", "krone", "nok"] },
    CurrencySpec { code: "SEK", pattern: r"SEK", names: &["swedish krona", "krona", "sek"] },
    CurrencySpec { code: "DKK", pattern: r"DKK", names: &["danish krone", "dkk"] },
    CurrencySpec { code: "PLN", pattern: r"zł|PLN", names: &["zloty", "pln"] },
    CurrencySpec { code: "THB", pattern: r"฿|THB", names: &["baht", "thb"] },
    CurrencySpec { code: "MYR", pattern: r"RM|MYR", names: &["ringgit", "myr"] },
    CurrencySpec { code: "IDR", pattern: r"Rp\.?|IDR", names: &["rupiah", "idr"] },
    CurrencySpec { code: "PHP", pattern: r"₱|PHP", names: &["peso", "php", "philippine peso"] },
    CurrencySpec { code: "MXN", pattern: r"MX\$|MXN", names: &["mexican peso", "mxn"] },
    CurrencySpec { code: "BRL", pattern: r"R\$|BRL", names: &["real", "reais", "brl", "brazilian real"] },
    CurrencySpec { code: "ARS", pattern: r"ARS", names: &["argentine peso", "ars"] },
    CurrencySpec { code: "CLP", pattern: r"CLP", names: &["chilean peso", "clp"] },
    CurrencySpec { code: "COP", pattern: r"COL\$|COP", names: &["colombian peso", "cop"] },
    CurrencySpec { code: "ZAR", pattern: r"ZAR", names: &["rand", "zar", "south african rand"] },
    CurrencySpec { code: "RUB", pattern: r"₽|RUB", names: &["ruble", "rouble", "rub"] },
    CurrencySpec { code: "TRY", pattern: r"₺|TRY", names: &["lira", "try", "turkish lira"] },
    CurrencySpec { code: "AED", pattern: r"AED|DH", names: &["dirham", "aed", "emirati dirham"] },
    CurrencySpec { code: "SAR", pattern: r"SAR|SR", names: &["riyal", "sar", "saudi riyal"] },
    CurrencySpec { code: "QAR", pattern: r"QAR|QR", names: &["qatari riyal", "qar"] },
    CurrencySpec { code: "KWD", pattern: r"KWD|KD", names: &["kuwaiti dinar", "kwd"] },
    CurrencySpec { code: "ILS", pattern: r"₪|ILS", names: &["shekel", "ils", "israeli shekel"] },
    CurrencySpec { code: "EGP", pattern: r"E£|EGP|LE", names: &["egyptian pound", "egp"] },
    CurrencySpec { code: "PKR", pattern: r"PKR", names: &["pakistani rupee", "pkr"] },
    CurrencySpec { code: "BDT", pattern: r"৳|BDT", names: &["taka", "bdt", "bangladeshi taka"] },
    CurrencySpec { code: "LKR", pattern: r"LKR", names: &["sri lankan rupee", "lkr"] },
    CurrencySpec { code: "NPR", pattern: r"NPR", names: &["nepalese rupee", "npr"] },
    CurrencySpec { code: "VND", pattern: r"₫|VND", names: &["dong", "vnd", "vietnamese dong"] },
    CurrencySpec { code: "KZT", pattern: r"₸|KZT", names: &["tenge", "kzt", "kazakhstani tenge"] },
    CurrencySpec { code: "UAH", pattern: r"₴|UAH", names: &["hryvnia", "uah", "ukrainian hryvnia"] },
    CurrencySpec { code: "NGN", pattern: r"₦|NGN", names: &["naira", "ngn", "nigerian naira"] },
    CurrencySpec { code: "KES", pattern: r"KSh|KES", names: &["kenyan shilling", "kes"] },
    CurrencySpec { code: "GHS", pattern: r"₵|GH₵|GHS", names: &["cedi", "ghs", "ghanaian cedi"] },
    CurrencySpec { code: "MAD", pattern: r"MAD", names: &["moroccan dirham", "mad"] },
    CurrencySpec { code: "TWD", pattern: r"NT\$|TWD", names: &["new taiwan dollar", "twd"] },
    CurrencySpec { code: "CZK", pattern: r"Kč|CZK", names: &["koruna", "czk", "czech koruna"] },
    CurrencySpec { code: "HUF", pattern: r"Ft|HUF", names: &["forint", "huf", "hungarian forint"] },
    CurrencySpec { code: "RON", pattern: r"RON", names: &["leu", "ron", "romanian leu"] },
    CurrencySpec { code: "BGN", pattern: r"BGN", names: &["lev", "bgn", "bulgarian lev"] },
    CurrencySpec { code: "HRK", pattern: r"HRK", names: &["kuna", "hrk", "croatian kuna"] },
];

static COMPILED_TABLE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    CURRENCY_TABLE
        .iter()
        .map(|spec| Regex::new(&format!("(?i){}", spec.pattern)).expect("static regex"))
        .collect()
});

static CORRUPTED_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.?\d*\s*\?\s*[=@]").expect("static regex"));
static PLACEHOLDER_RATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@\s*\?\s*(\d+\.?\d*)").expect("static regex"));
static GBP_MOJIBAKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("G[\\s\u{ef}\u{bf}\u{bd}\u{fffd}\u{a3}£\u{c2}\u{c3}\u{201a}\u{af}]").expect("static regex"));
static EUR_BEFORE_EQUALS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[€?\u{fffd}\u{c3}\u{a2}\u{e2}\u{201a}\u{ac}\u{ef}\u{bf}\u{bd}]\\s*=").expect("static regex"));
static EUR_BEFORE_DIGIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("(^|\\s)[€?\u{fffd}\u{c3}\u{a2}\u{e2}\u{201a}\u{ac}\u{ef}\u{bf}\u{bd}]\\s*\\d")
        .expect("static regex")
});
static REPLACEMENT_EQUALS_DIGIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("\u{ef}\u{bf}\u{bd}\\s*=\\s*[?\\s]*\\d").expect("static regex"));
static PLACEHOLDER_AT_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\?\s*@\s*\?").expect("static regex"));
static CAD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)CA\$|CAD").expect("static regex"));
static CAD_SYMBOL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"C\$").expect("static regex"));
static AUD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)AU\$|AUD").expect("static regex"));
static AUD_SYMBOL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"A\$").expect("static regex"));

// "AMOUNT SYM @ ? RATE/SYM = ? BASE" — checked first because it is
// strictly more informative than the "= BASE" form.
static AMOUNT_AT_RATE_BASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(-?\d+\.?\d*)\s*([^\d\s=@]+)\s*@\s*[^\d\s=@]+\s*(-?\d+\.?\d*)\s*/\s*[^\d\s=]+\s*=\s*[?]?\s*(-?\d+\.?\d*)",
    )
    .expect("static regex")
});
// "AMOUNT SYM = ? BASE"
static AMOUNT_EQUALS_BASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(-?\d+\.?\d*)\s*([^\d\s=@]+)\s*=\s*[^\d\s]+\s*(-?\d+\.?\d*)")
        .expect("static regex")
});
// "@ ? RATE/ SYM" appearing anywhere in the text.
static EXPLICIT_RATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@\s*[?]?\s*(-?\d+\.?\d*)\s*/\s*[^\d\s=]+").expect("static regex")
});
// "SYM AMOUNT" or "AMOUNT SYM" with no conversion.
static SYMBOL_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([^\d\s]+)\s*(-?\d+\.?\d*)|^(-?\d+\.?\d*)\s*([^\d\s]+)").expect("static regex")
});
static FIRST_DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(-?\d+\.?\d*)").expect("static regex"));

// Used by the line-money fallbacks when the structured patterns miss.
static FOREIGN_LINE_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[?€$£¥]\s*@\s*[?€$£¥].*?/\s*[?€$£¥]\s*=").expect("static regex")
});
static FOREIGN_RATE_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?€$£¥]\s*=\s*[?€$£¥]").expect("static regex"));
static AMOUNT_RATE_FALLBACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(-?\d+\.?\d*)\s*[€$£¥?]\s*@\s*[€$£¥?]\s*(-?\d+\.?\d*)\s*/\s*[€$£¥?]")
        .expect("static regex")
});
static RATE_EQUALS_FALLBACK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(-?\d+\.?\d*)\s*[€$£¥?]\s*=").expect("static regex"));

/// Structured recovery of one foreign-currency field.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignCurrencyDetails {
    pub foreign_amount: Option<f64>,
    pub currency: String,
    pub exchange_rate: Option<f64>,
    pub base_amount: Option<f64>,
}

/// Currency-resolved rate/amount/discount for one voucher line.
#[derive(Debug, Clone, PartialEq)]
pub struct LineMoney {
    pub currency: String,
    pub rate: f64,
    pub amount: f64,
    pub discount: f64,
    pub exchange_rate: f64,
}

impl LineMoney {
    #[must_use]
    pub fn is_foreign(&self) -> bool {
        self.currency != "INR" && self.exchange_rate > 1.0
    }
}

#[derive(Debug, Clone)]
pub struct CurrencyExtractor {
    default_currency: String,
}

impl Default for CurrencyExtractor {
    fn default() -> Self {
        Self::new("INR")
    }
}

impl CurrencyExtractor {
    #[must_use]
    pub fn new(default_currency: impl Into<String>) -> Self {
        Self {
            default_currency: default_currency.into(),
        }
    }

    /// Resolve a currency code from text. Empty or numeric-only input
    /// yields the default currency.
    #[must_use]
    pub fn extract_currency(&self, text: &str) -> String {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == "0" {
            return self.default_currency.clone();
        }

        // Corrupted placeholder: a decimal followed by `?` then `=`/`@`.
        // The symbol is gone, so infer the code from the exchange-rate
        // band when one is present.
        if CORRUPTED_PLACEHOLDER.is_match(text) {
            if let Some(rate) = PLACEHOLDER_RATE
                .captures(text)
                .and_then(|caps| caps.get(1))
                .and_then(|group| group.as_str().parse::<f64>().ok())
            {
                if (95.0..=115.0).contains(&rate) {
                    return "GBP".to_string();
                }
                if (85.0..95.0).contains(&rate) {
                    return "EUR".to_string();
                }
                if (75.0..85.0).contains(&rate) {
                    return "USD".to_string();
                }
            }
            return "EUR".to_string();
        }

        if GBP_MOJIBAKE.is_match(text)
            || text.contains('\u{a3}')
            || text.contains("Â£")
            || text.contains("Gï¿½")
            || text.contains('\u{fffd}')
        {
            return "GBP".to_string();
        }

        if EUR_BEFORE_EQUALS.is_match(text)
            || EUR_BEFORE_DIGIT.is_match(text)
            || (text.contains("ï¿½") && REPLACEMENT_EQUALS_DIGIT.is_match(text))
            || (text.contains('?') && PLACEHOLDER_AT_PLACEHOLDER.is_match(text))
        {
            return "EUR".to_string();
        }

        if CAD_PATTERN.is_match(text) || CAD_SYMBOL.is_match(text) {
            return "CAD".to_string();
        }
        if AUD_PATTERN.is_match(text) || AUD_SYMBOL.is_match(text) {
            return "AUD".to_string();
        }

        for (spec, regex) in CURRENCY_TABLE.iter().zip(COMPILED_TABLE.iter()) {
            if regex.is_match(text) {
                return spec.code.to_string();
            }
        }

        let lowered = text.to_lowercase();
        for spec in CURRENCY_TABLE {
            if spec.names.iter().any(|name| lowered.contains(name)) {
                return spec.code.to_string();
            }
        }

        self.default_currency.clone()
    }

    /// Multi-strategy recovery of amount, currency, rate and base amount
    /// from one upstream field.
    #[must_use]
    pub fn extract_foreign(&self, text: &str) -> ForeignCurrencyDetails {
        let mut details = ForeignCurrencyDetails {
            foreign_amount: None,
            currency: self.default_currency.clone(),
            exchange_rate: None,
            base_amount: None,
        };
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == "0" {
            return details;
        }

        if let Some(caps) = AMOUNT_AT_RATE_BASE.captures(text) {
            details.foreign_amount = caps.get(1).and_then(|g| g.as_str().parse().ok());
            details.exchange_rate = caps.get(3).and_then(|g| g.as_str().parse().ok());
            details.base_amount = caps.get(4).and_then(|g| g.as_str().parse().ok());
            if let Some(symbol) = caps.get(2) {
                details.currency = self.extract_currency(symbol.as_str().trim());
            }
            return details;
        }

        if let Some(caps) = AMOUNT_EQUALS_BASE.captures(text) {
            details.foreign_amount = caps.get(1).and_then(|g| g.as_str().parse().ok());
            details.base_amount = caps.get(3).and_then(|g| g.as_str().parse().ok());
            if let Some(symbol) = caps.get(2) {
                details.currency = self.extract_currency(symbol.as_str().trim());
            }
            if let (Some(foreign), Some(base)) = (details.foreign_amount, details.base_amount)
                && foreign != 0.0
            {
                details.exchange_rate = Some(base / foreign);
            }
            if let Some(rate) = EXPLICIT_RATE
                .captures(text)
                .and_then(|caps| caps.get(1))
                .and_then(|group| group.as_str().parse().ok())
            {
                details.exchange_rate = Some(rate);
            }
            return details;
        }

        if let Some(caps) = SYMBOL_AMOUNT.captures(text) {
            if let (Some(symbol), Some(amount)) = (caps.get(1), caps.get(2)) {
                details.foreign_amount = amount.as_str().parse().ok();
                details.currency = self.extract_currency(symbol.as_str().trim());
            } else if let (Some(amount), Some(symbol)) = (caps.get(3), caps.get(4)) {
                details.foreign_amount = amount.as_str().parse().ok();
                details.currency = self.extract_currency(symbol.as_str().trim());
            }
            return details;
        }

        if let Some(amount) = FIRST_DECIMAL
            .captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|group| group.as_str().parse().ok())
        {
            details.foreign_amount = Some(amount);
            details.currency = self.extract_currency(text);
        }
        details
    }

    /// Rate-field variant: `(foreign_amount, currency, base_amount)`.
    #[must_use]
    pub fn extract_rate_and_currency(&self, rate_text: &str) -> (Option<f64>, String, Option<f64>) {
        let details = self.extract_foreign(rate_text);
        (details.foreign_amount, details.currency, details.base_amount)
    }

    /// Resolve the currency plus rate/amount/discount values for one
    /// voucher line from its raw rate, amount and discount fields.
    #[must_use]
    pub fn line_money(
        &self,
        rate_text: Option<&str>,
        amount_text: Option<&str>,
        discount_text: Option<&str>,
    ) -> LineMoney {
        let mut money = LineMoney {
            currency: "INR".to_string(),
            rate: 0.0,
            amount: 0.0,
            discount: 0.0,
            exchange_rate: 1.0,
        };

        let mut detected = "INR".to_string();
        for text in [rate_text, amount_text].into_iter().flatten() {
            let candidate = self.extract_currency(text);
            if candidate != "INR" {
                detected = candidate;
            }
        }

        // Both fields can individually look INR while the pair still
        // carries a corrupted conversion expression.
        if detected == "INR" {
            let amount_hint = amount_text.is_some_and(|text| FOREIGN_LINE_HINT.is_match(text));
            let rate_hint = rate_text.is_some_and(|text| FOREIGN_RATE_HINT.is_match(text));
            if amount_hint || rate_hint {
                let combined =
                    format!("{} {}", amount_text.unwrap_or(""), rate_text.unwrap_or(""));
                let upper = combined.to_uppercase();
                if combined.contains('€') || upper.contains("EUR") {
                    detected = "EUR".to_string();
                } else if combined.contains('$') || upper.contains("USD") {
                    detected = "USD".to_string();
                } else if combined.contains('£') || upper.contains("GBP") {
                    detected = "GBP".to_string();
                } else if combined.contains('?') {
                    detected = "EUR".to_string();
                }
            }
        }

        money.currency = detected.clone();

        if detected == "INR" {
            if let Some(text) = rate_text {
                money.rate = numeric_amount(text);
            }
            if let Some(text) = amount_text {
                money.amount = numeric_amount(text);
            }
            if let Some(text) = discount_text {
                money.discount = numeric_amount(text);
            }
            return money;
        }

        if let Some(text) = amount_text {
            let details = self.extract_foreign(text);
            if let Some(foreign) = details.foreign_amount {
                money.amount = foreign.abs();
            }
            if let Some(rate) = details.exchange_rate {
                money.exchange_rate = rate;
            }
            if money.exchange_rate == 1.0
                && let Some(caps) = AMOUNT_RATE_FALLBACK.captures(text)
            {
                if money.amount == 0.0 {
                    money.amount = caps
                        .get(1)
                        .and_then(|g| g.as_str().parse::<f64>().ok())
                        .map(f64::abs)
                        .unwrap_or(0.0);
                }
                money.exchange_rate = caps
                    .get(2)
                    .and_then(|g| g.as_str().parse::<f64>().ok())
                    .map(f64::abs)
                    .unwrap_or(1.0);
            }
        }

        if let Some(text) = rate_text {
            let details = self.extract_foreign(text);
            if let Some(foreign) = details.foreign_amount {
                money.rate = foreign.abs();
            }
            if money.rate == 0.0
                && let Some(rate) = RATE_EQUALS_FALLBACK
                    .captures(text)
                    .and_then(|caps| caps.get(1))
                    .and_then(|group| group.as_str().parse::<f64>().ok())
            {
                money.rate = rate.abs();
            }
            if money.exchange_rate == 1.0
                && let (Some(foreign), Some(base)) = (details.foreign_amount, details.base_amount)
                && foreign != 0.0
            {
                money.exchange_rate = (base / foreign).abs();
            }
        }

        if let Some(text) = discount_text {
            let details = self.extract_foreign(text);
            money.discount = match details.foreign_amount {
                Some(foreign) => foreign.abs(),
                None => numeric_amount(text),
            };
        }

        money
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn extractor() -> CurrencyExtractor {
        CurrencyExtractor::default()
    }

    #[test]
    fn empty_and_numeric_inputs_default_to_inr() {
        assert_eq!(extractor().extract_currency(""), "INR");
        assert_eq!(extractor().extract_currency("0"), "INR");
        assert_eq!(extractor().extract_currency("1234.56"), "INR");
    }

    #[test]
    fn explicit_codes_and_symbols_resolve() {
        assert_eq!(extractor().extract_currency("1000 USD"), "USD");
        assert_eq!(extractor().extract_currency("£ 33.93"), "GBP");
        assert_eq!(extractor().extract_currency("€ 14.00"), "EUR");
        assert_eq!(extractor().extract_currency("CA$ 25"), "CAD");
        assert_eq!(extractor().extract_currency("AU$ 25"), "AUD");
    }

    #[test]
    fn corrupted_placeholder_uses_rate_bands() {
        assert_eq!(
            extractor().extract_currency("9.60 ? @ ? 105.18/ ? = ? 656651.36"),
            "GBP"
        );
        assert_eq!(
            extractor().extract_currency("9.60 ? @ ? 89.23/ ? = ? 856.60"),
            "EUR"
        );
        assert_eq!(
            extractor().extract_currency("9.60 ? @ ? 82.50/ ? = ? 792.00"),
            "USD"
        );
        // No rate in sight: default to EUR for the placeholder family.
        assert_eq!(extractor().extract_currency("9.60? = ? 864.00/Box"), "EUR");
    }

    #[test]
    fn mojibake_families_resolve() {
        assert_eq!(extractor().extract_currency("G\u{fffd} 12.00"), "GBP");
        assert_eq!(extractor().extract_currency("Â£ 12.00"), "GBP");
        assert_eq!(extractor().extract_currency("currency name: pounds"), "GBP");
    }

    #[test]
    fn structured_extraction_recovers_all_fields() {
        let details = extractor().extract_foreign("6243.12 £ @ ? 105.18/ £ = ? 656651.36");
        assert_eq!(details.currency, "GBP");
        assert_eq!(details.foreign_amount, Some(6243.12));
        assert_eq!(details.exchange_rate, Some(105.18));
        assert_eq!(details.base_amount, Some(656651.36));
    }

    #[test]
    fn equals_form_derives_the_rate() {
        let details = extractor().extract_foreign("33.93 £ = ? 3568.76/Box");
        assert_eq!(details.currency, "GBP");
        assert_eq!(details.foreign_amount, Some(33.93));
        assert_eq!(details.base_amount, Some(3568.76));
        let rate = details.exchange_rate.expect("derived rate");
        assert!((rate - 3568.76 / 33.93).abs() < 1e-9);
    }

    #[test]
    fn bare_amount_with_code() {
        let details = extractor().extract_foreign("1000 USD");
        assert_eq!(details.currency, "USD");
        assert_eq!(details.foreign_amount, Some(1000.0));
        assert_eq!(details.base_amount, None);
    }

    #[test]
    fn round_trip_recovers_generated_fields() {
        let extractor = extractor();
        for (code, symbol) in [("GBP", "£"), ("EUR", "€"), ("USD", "$")] {
            for (foreign, rate) in [(12.5_f64, 105.18_f64), (6243.12, 89.23), (1.0, 82.5)] {
                let base = foreign * rate;
                let text = format!("{foreign} {symbol} @ ? {rate}/ {symbol} = ? {base:.2}");
                let details = extractor.extract_foreign(&text);
                assert_eq!(details.currency, code, "input {text}");
                let got_foreign = details.foreign_amount.expect("foreign");
                let got_rate = details.exchange_rate.expect("rate");
                let got_base = details.base_amount.expect("base");
                assert!((got_foreign - foreign).abs() < 0.01);
                assert!((got_rate - rate).abs() < 0.01);
                assert!((got_base - base).abs() < 0.01);
            }
        }
    }

    #[test]
    fn line_money_stays_inr_for_plain_numbers() {
        let money = extractor().line_money(Some("105.18/ Box"), Some("-1261.80"), None);
        assert_eq!(money.currency, "INR");
        assert_eq!(money.exchange_rate, 1.0);
        assert_eq!(money.rate, 105.18);
        assert_eq!(money.amount, 1261.80);
    }

    #[test]
    fn line_money_resolves_foreign_lines() {
        let money = extractor().line_money(
            Some("33.93 £ @ ? 105.18/ £ = ? 3568.76"),
            Some("6243.12 £ @ ? 105.18/ £ = ? 656651.36"),
            None,
        );
        assert_eq!(money.currency, "GBP");
        assert_eq!(money.amount, 6243.12);
        assert_eq!(money.rate, 33.93);
        assert!((money.exchange_rate - 105.18).abs() < 1e-9);
        assert!(money.is_foreign());
    }
}
