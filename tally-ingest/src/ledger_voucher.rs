//! Ledger voucher parser (receipt, payment, journal, contra): one row
//! per ledger entry.

use tracing::error;
use tracing::info;
use tracing::warn;

use crate::AmountType;
use crate::LedgerVoucherRow;
use crate::change_status_of;
use crate::currency::CurrencyExtractor;
use crate::text::clean_text;
use crate::text::first_number_is_negative;
use crate::text::parse_business_date;
use crate::xml;
use crate::xml::Element;

/// Parse a sanitized ledger-voucher response. `type_label` is only used
/// for logging; the row's `voucher_type` comes from the document itself.
#[must_use]
pub fn parse_ledger_vouchers(
    xml_content: &str,
    company_name: &str,
    type_label: &str,
) -> Vec<LedgerVoucherRow> {
    if xml_content.trim().is_empty() {
        warn!("empty payload for {type_label}");
        return Vec::new();
    }
    let root = match xml::parse_document(xml_content) {
        Ok(root) => root,
        Err(err) => {
            error!("xml parse error in {type_label}: {err}");
            return Vec::new();
        }
    };

    let vouchers = root.descendants("VOUCHER");
    info!("found {} {type_label} vouchers", vouchers.len());

    let extractor = CurrencyExtractor::default();
    let mut rows = Vec::new();

    for voucher in vouchers {
        let guid = voucher.child_text_or("GUID", "");
        let alter_id: i64 = voucher
            .child_text_or("ALTERID", "0")
            .trim()
            .parse()
            .unwrap_or(0);
        let master_id = voucher.child_text_or("MASTERID", "");
        let voucher_number = clean_text(&voucher.child_text_or("VOUCHERNUMBER", ""));
        let voucher_type = clean_text(&voucher.child_text_or("VOUCHERTYPENAME", ""));
        let date = parse_business_date(&clean_text(&voucher.child_text_or("DATE", "")));
        let reference = clean_text(&voucher.child_text_or("REFERENCE", ""));
        let narration = clean_text(&voucher.child_text_or("NARRATION", ""));

        let (change_status, is_deleted) = change_status_of(
            voucher.attr("ACTION"),
            &voucher.child_text_or("ISDELETED", "No"),
        );

        let entries = ledger_entries(voucher);

        // Deleted vouchers from CDC arrive with no entries; a single stub
        // row lets the writer mark every stored row for this guid deleted.
        if entries.is_empty() && is_deleted {
            rows.push(LedgerVoucherRow {
                company_name: company_name.to_string(),
                date,
                voucher_type,
                voucher_number,
                reference,
                ledger_name: String::new(),
                amount: 0.0,
                amount_type: None,
                currency: "INR".to_string(),
                exchange_rate: 1.0,
                narration,
                guid,
                alter_id,
                master_id,
                change_status,
                is_deleted: true,
            });
            continue;
        }

        // Voucher-level scan: the first entry carrying a real foreign
        // conversion decides the currency for INR-looking siblings.
        let mut voucher_currency = "INR".to_string();
        let mut voucher_rate = 1.0_f64;
        for entry in &entries {
            let amount_text = clean_text(&entry.child_text_or("AMOUNT", "0"));
            let money = extractor.line_money(None, Some(&amount_text), None);
            if money.is_foreign() {
                voucher_currency = money.currency;
                voucher_rate = money.exchange_rate;
                break;
            }
        }

        for entry in &entries {
            let ledger_name = clean_text(&entry.child_text_or("LEDGERNAME", ""));
            let amount_text = clean_text(&entry.child_text_or("AMOUNT", "0"));
            let mut money = extractor.line_money(None, Some(&amount_text), None);
            if money.exchange_rate == 1.0 && voucher_rate > 1.0 {
                money.exchange_rate = voucher_rate;
                money.currency = voucher_currency.clone();
            }

            let amount_type = if first_number_is_negative(&amount_text) {
                AmountType::Debit
            } else {
                AmountType::Credit
            };

            rows.push(LedgerVoucherRow {
                company_name: company_name.to_string(),
                date,
                voucher_type: voucher_type.clone(),
                voucher_number: voucher_number.clone(),
                reference: reference.clone(),
                ledger_name,
                amount: money.amount,
                amount_type: Some(amount_type),
                currency: money.currency,
                exchange_rate: money.exchange_rate,
                narration: narration.clone(),
                guid: guid.clone(),
                alter_id,
                master_id: master_id.clone(),
                change_status: change_status.clone(),
                is_deleted,
            });
        }
    }

    info!("parsed {} rows for {type_label} [{company_name}]", rows.len());
    rows
}

fn ledger_entries(voucher: &Element) -> Vec<&Element> {
    let entries = voucher.descendants("ALLLEDGERENTRIES.LIST");
    if entries.is_empty() {
        voucher.descendants("LEDGERENTRIES.LIST")
    } else {
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn receipt_xml() -> String {
        "<ENVELOPE><VOUCHER ACTION=\"Create\">\
         <GUID>rv-1</GUID><ALTERID>11</ALTERID><MASTERID>900</MASTERID>\
         <VOUCHERNUMBER>R-7</VOUCHERNUMBER><VOUCHERTYPENAME>Receipt</VOUCHERTYPENAME>\
         <DATE>20240510</DATE><NARRATION>monthly settlement</NARRATION>\
         <ALLLEDGERENTRIES.LIST><LEDGERNAME>Acme Traders</LEDGERNAME>\
         <AMOUNT>-5000.00</AMOUNT></ALLLEDGERENTRIES.LIST>\
         <ALLLEDGERENTRIES.LIST><LEDGERNAME>HDFC Bank</LEDGERNAME>\
         <AMOUNT>5000.00</AMOUNT></ALLLEDGERENTRIES.LIST>\
         </VOUCHER></ENVELOPE>"
            .to_string()
    }

    #[test]
    fn emits_one_row_per_entry_with_debit_credit_split() {
        let rows = parse_ledger_vouchers(&receipt_xml(), "Demo Co", "Receipt Vouchers");
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].ledger_name, "Acme Traders");
        assert_eq!(rows[0].amount, 5000.0);
        assert_eq!(rows[0].amount_type, Some(AmountType::Debit));

        assert_eq!(rows[1].ledger_name, "HDFC Bank");
        assert_eq!(rows[1].amount_type, Some(AmountType::Credit));

        for row in &rows {
            assert_eq!(row.guid, "rv-1");
            assert_eq!(row.alter_id, 11);
            assert_eq!(row.voucher_number, "R-7");
            assert_eq!(row.date, NaiveDate::from_ymd_opt(2024, 5, 10));
            assert_eq!(row.change_status, "Create");
        }
    }

    #[test]
    fn foreign_scan_propagates_to_inr_lines() {
        let xml = "<ENVELOPE><VOUCHER ACTION=\"Alter\">\
             <GUID>pv-1</GUID><ALTERID>20</ALTERID>\
             <VOUCHERNUMBER>P-3</VOUCHERNUMBER><VOUCHERTYPENAME>Payment</VOUCHERTYPENAME>\
             <DATE>20240601</DATE>\
             <ALLLEDGERENTRIES.LIST><LEDGERNAME>Overseas Supplier</LEDGERNAME>\
             <AMOUNT>-800.00 £ @ ? 105.18/ £ = ? 84144.00</AMOUNT></ALLLEDGERENTRIES.LIST>\
             <ALLLEDGERENTRIES.LIST><LEDGERNAME>HDFC Bank</LEDGERNAME>\
             <AMOUNT>84144.00</AMOUNT></ALLLEDGERENTRIES.LIST>\
             </VOUCHER></ENVELOPE>";
        let rows = parse_ledger_vouchers(xml, "Demo Co", "Payment Vouchers");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].currency, "GBP");
        assert!((rows[0].exchange_rate - 105.18).abs() < 1e-9);
        // The INR-looking bank leg inherits the voucher-level currency.
        assert_eq!(rows[1].currency, "GBP");
        assert!((rows[1].exchange_rate - 105.18).abs() < 1e-9);
    }

    #[test]
    fn deleted_voucher_without_entries_yields_stub() {
        let xml = "<ENVELOPE><VOUCHER ACTION=\"Delete\">\
             <GUID>gone-1</GUID><ALTERID>33</ALTERID>\
             <VOUCHERNUMBER>J-9</VOUCHERNUMBER><VOUCHERTYPENAME>Journal</VOUCHERTYPENAME>\
             <DATE>20240215</DATE><ISDELETED>Yes</ISDELETED>\
             </VOUCHER></ENVELOPE>";
        let rows = parse_ledger_vouchers(xml, "Demo Co", "Journal Vouchers");
        assert_eq!(rows.len(), 1);
        let stub = &rows[0];
        assert!(stub.is_deletion_stub());
        assert_eq!(stub.change_status, "Deleted");
        assert_eq!(stub.amount, 0.0);
        assert_eq!(stub.amount_type, None);
        assert_eq!(stub.alter_id, 33);
    }

    #[test]
    fn every_row_of_a_voucher_shares_version_fields() {
        let rows = parse_ledger_vouchers(&receipt_xml(), "Demo Co", "Receipt Vouchers");
        let first = &rows[0];
        assert!(rows.iter().all(|row| {
            row.guid == first.guid
                && row.alter_id == first.alter_id
                && row.voucher_number == first.voucher_number
                && row.date == first.date
                && row.change_status == first.change_status
        }));
    }

    #[test]
    fn malformed_xml_is_an_empty_batch() {
        assert!(parse_ledger_vouchers("<VOUCHER>", "Demo Co", "Contra").is_empty());
    }
}
