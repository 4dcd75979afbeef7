//! Trial balance parser: per (company, ledger, period) balances.

use chrono::NaiveDate;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::TrialBalanceRow;
use crate::text::clean_text;
use crate::text::numeric_amount;
use crate::xml;

/// Parse a sanitized trial-balance response. The period bounds come from
/// the caller because the upstream echoes only balances, not dates.
#[must_use]
pub fn parse_trial_balance(
    xml_content: &str,
    company_name: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Vec<TrialBalanceRow> {
    if xml_content.trim().is_empty() {
        warn!("empty trial balance payload for {company_name}");
        return Vec::new();
    }
    let root = match xml::parse_document(xml_content) {
        Ok(root) => root,
        Err(err) => {
            error!("trial balance parse failed for {company_name}: {err}");
            return Vec::new();
        }
    };

    let mut rows = Vec::new();
    for ledger in root.descendants("LEDGER") {
        let mut ledger_name = ledger.attr("NAME").unwrap_or_default().to_string();
        if ledger_name.is_empty() {
            ledger_name = ledger.child_text_or("LEDGERNAME", "");
        }
        let ledger_name = clean_text(&ledger_name);
        if ledger_name.is_empty() {
            continue;
        }

        let opening = numeric_amount(&clean_text(&ledger.child_text_or("OPENINGBALANCE", "0")));
        let closing = numeric_amount(&clean_text(&ledger.child_text_or("CLOSINGBALANCE", "0")));

        rows.push(TrialBalanceRow {
            company_name: company_name.to_string(),
            ledger_name,
            parent_group: clean_text(&ledger.child_text_or("PARENT", "")),
            opening_balance: opening,
            net_transactions: closing - opening,
            closing_balance: closing,
            start_date: Some(start_date),
            end_date: Some(end_date),
            guid: clean_text(&ledger.child_text_or("GUID", "")),
            alter_id: ledger
                .child_text_or("ALTERID", "0")
                .trim()
                .parse()
                .unwrap_or(0),
            master_id: clean_text(&ledger.child_text_or("MASTERID", "")),
        });
    }

    info!("parsed {} trial balance rows [{company_name}]", rows.len());
    rows
}
