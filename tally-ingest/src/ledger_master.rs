//! Ledger master parser: one row per `LEDGER` element.

use tracing::error;
use tracing::info;
use tracing::warn;

use crate::LedgerRow;
use crate::text::clean_text;
use crate::xml;
use crate::xml::Element;

/// Parse a sanitized ledger-master response. Malformed XML yields an
/// empty row list; the caller treats that the same as an empty response.
#[must_use]
pub fn parse_ledgers(xml_content: &str, company_name: &str) -> Vec<LedgerRow> {
    if xml_content.trim().is_empty() {
        warn!("empty ledger master payload for {company_name}");
        return Vec::new();
    }
    let root = match xml::parse_document(xml_content) {
        Ok(root) => root,
        Err(err) => {
            error!("ledger master parse failed for {company_name}: {err}");
            return Vec::new();
        }
    };

    let ledgers = root.descendants("LEDGER");
    if ledgers.is_empty() {
        warn!("no LEDGER elements found for {company_name}");
        return Vec::new();
    }

    let rows: Vec<LedgerRow> = ledgers
        .into_iter()
        .map(|ledger| ledger_row(ledger, company_name))
        .collect();
    info!("parsed {} ledgers [{company_name}]", rows.len());
    rows
}

fn ledger_row(ledger: &Element, company_name: &str) -> LedgerRow {
    let ledger_name = ledger.attr("NAME").unwrap_or_default().to_string();
    let aliases = collect_aliases(ledger, &ledger_name);
    let addresses = collect_address_lines(ledger);

    let field = |name: &str| clean_text(&ledger.child_text_or(name, ""));

    LedgerRow {
        company_name: company_name.to_string(),
        alias: aliases.first().cloned().unwrap_or_default(),
        alias_2: aliases.get(1).cloned().unwrap_or_default(),
        alias_3: aliases.get(2).cloned().unwrap_or_default(),
        parent_group: field("PARENT"),
        contact_person: field("LEDGERCONTACT"),
        email: field("EMAIL"),
        phone: field("LEDGERPHONE"),
        mobile: field("LEDGERMOBILE"),
        fax: field("LEDGERFAX"),
        website: field("WEBSITE"),
        address_line_1: addresses.first().cloned().unwrap_or_default(),
        address_line_2: addresses.get(1).cloned().unwrap_or_default(),
        address_line_3: addresses.get(2).cloned().unwrap_or_default(),
        pincode: field("PINCODE"),
        state: field("STATENAME"),
        country: field("COUNTRYNAME"),
        opening_balance: clean_text(&ledger.child_text_or("OPENINGBALANCE", "0")),
        credit_limit: clean_text(&ledger.child_text_or("CREDITLIMIT", "0")),
        bill_credit_period: field("BILLCREDITPERIOD"),
        pan: field("INCOMETAXNUMBER"),
        gstin: field("PARTYGSTIN"),
        gst_registration_type: field("GSTREGISTRATIONTYPE"),
        vat_tin: field("VATTINNUMBER"),
        sales_tax_number: field("SALESTAXNUMBER"),
        bank_account_holder: field("BANKACCHOLDERNAME"),
        ifsc_code: field("IFSCODE"),
        bank_branch: field("BRANCHNAME"),
        swift_code: field("SWIFTCODE"),
        bank_iban: field("BANKIBAN"),
        export_import_code: field("EXPORTIMPORTCODE"),
        msme_reg_number: field("MSMEREGNUMBER"),
        is_bill_wise_on: clean_text(&ledger.child_text_or("ISBILLWISEON", "No")),
        is_deleted: ledger.child_text_or("ISDELETED", "No") == "Yes",
        created_date: field("CREATEDDATE"),
        altered_on: field("ALTEREDON"),
        guid: clean_text(&ledger.child_text_or("GUID", "")),
        alter_id: ledger
            .child_text_or("ALTERID", "0")
            .trim()
            .parse()
            .unwrap_or(0),
        ledger_name,
    }
}

/// Aliases come from a direct `ALIAS` element and from nested
/// `LANGUAGENAME.LIST / NAME.LIST / NAME` tuples, de-duplicated against
/// the principal name.
fn collect_aliases(ledger: &Element, ledger_name: &str) -> Vec<String> {
    let mut aliases = Vec::new();
    let direct = clean_text(&ledger.child_text_or("ALIAS", ""));
    if !direct.is_empty() && direct != ledger_name {
        aliases.push(direct);
    }
    for lang_list in ledger.descendants("LANGUAGENAME.LIST") {
        for name_list in lang_list.descendants("NAME.LIST") {
            for name in name_list.children_named("NAME") {
                let alias = clean_text(&name.text());
                if !alias.is_empty() && alias != ledger_name && !aliases.contains(&alias) {
                    aliases.push(alias);
                }
            }
        }
    }
    aliases
}

/// Address lines flattened in document order.
fn collect_address_lines(ledger: &Element) -> Vec<String> {
    let mut lines = Vec::new();
    for addr_list in ledger.descendants("ADDRESS.LIST") {
        for address in addr_list.children_named("ADDRESS") {
            let line = clean_text(&address.text());
            if !line.is_empty() {
                lines.push(line);
            }
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> String {
        "<ENVELOPE>\
         <LEDGER NAME=\"Acme Traders\">\
           <GUID>led-1</GUID><ALTERID>42</ALTERID><PARENT>Sundry Debtors</PARENT>\
           <EMAIL>acme@example.com</EMAIL><PARTYGSTIN>27AAAPL1234C1ZV</PARTYGSTIN>\
           <ALIAS>Acme</ALIAS>\
           <LANGUAGENAME.LIST><NAME.LIST>\
             <NAME>Acme Traders</NAME><NAME>Acme</NAME><NAME>ACME T</NAME><NAME>A.T.</NAME>\
           </NAME.LIST></LANGUAGENAME.LIST>\
           <ADDRESS.LIST><ADDRESS>12 Mill Road</ADDRESS><ADDRESS>Pune</ADDRESS></ADDRESS.LIST>\
           <OPENINGBALANCE>-1500.00</OPENINGBALANCE>\
           <ISDELETED>No</ISDELETED>\
         </LEDGER>\
         </ENVELOPE>"
            .to_string()
    }

    #[test]
    fn extracts_master_attributes() {
        let rows = parse_ledgers(&sample(), "Demo Co");
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.ledger_name, "Acme Traders");
        assert_eq!(row.guid, "led-1");
        assert_eq!(row.alter_id, 42);
        assert_eq!(row.parent_group, "Sundry Debtors");
        assert_eq!(row.gstin, "27AAAPL1234C1ZV");
        assert_eq!(row.opening_balance, "-1500.00");
        assert!(!row.is_deleted);
    }

    #[test]
    fn aliases_dedupe_against_principal_name_and_cap_at_three() {
        let rows = parse_ledgers(&sample(), "Demo Co");
        let row = &rows[0];
        // Direct ALIAS first, then language names minus the principal
        // name and the duplicate of the direct alias.
        assert_eq!(row.alias, "Acme");
        assert_eq!(row.alias_2, "ACME T");
        assert_eq!(row.alias_3, "A.T.");
    }

    #[test]
    fn address_lines_flatten_in_document_order() {
        let rows = parse_ledgers(&sample(), "Demo Co");
        assert_eq!(rows[0].address_line_1, "12 Mill Road");
        assert_eq!(rows[0].address_line_2, "Pune");
        assert_eq!(rows[0].address_line_3, "");
    }

    #[test]
    fn malformed_xml_yields_no_rows() {
        assert!(parse_ledgers("<ENVELOPE><LEDGER>", "Demo Co").is_empty());
        assert!(parse_ledgers("", "Demo Co").is_empty());
    }
}
