//! Inventory voucher parser (sales, purchase, credit note, debit note):
//! one row per line item, with voucher-level tax buckets apportioned by
//! line-amount weight.

use std::sync::LazyLock;

use regex_lite::Regex;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::InventoryVoucherRow;
use crate::change_status_of;
use crate::currency::CurrencyExtractor;
use crate::currency::LineMoney;
use crate::text::clean_text;
use crate::text::extract_unit_from_rate;
use crate::text::format_business_date;
use crate::text::numeric_amount;
use crate::text::parse_business_date;
use crate::text::parse_expiry_date;
use crate::text::parse_quantity_with_unit;
use crate::xml;
use crate::xml::Element;

// Ledger-name classification families. There is no canonical list for
// "other charges"; the negative filters below mirror what operators
// actually name their ledgers.
static CGST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)cgst|c\.gst").expect("static regex"));
static SGST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)sgst|s\.gst").expect("static regex"));
static IGST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)igst|i\.gst").expect("static regex"));
static GST_DIRECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)input|output").expect("static regex"));
static GST_RATE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@\s*(\d+\.?\d*)\s*%?").expect("static regex"));
static FREIGHT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)freight").expect("static regex"));
static DCA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)dca").expect("static regex"));
static CLEARING_FORWARDING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)clearing\s*&?\s*forwarding").expect("static regex"));
static ROUNDING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)round").expect("static regex"));
static DUTY_OR_CESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)duty|cess").expect("static regex"));

#[derive(Default)]
struct GstBuckets {
    cgst_total: f64,
    sgst_total: f64,
    igst_total: f64,
    cgst_rate: f64,
    sgst_rate: f64,
    igst_rate: f64,
}

#[derive(Default)]
struct ChargeBuckets {
    freight_amt: f64,
    dca_amt: f64,
    cf_amt: f64,
    other_amt: f64,
}

impl ChargeBuckets {
    fn total(&self) -> f64 {
        self.freight_amt + self.dca_amt + self.cf_amt + self.other_amt
    }
}

struct LineItem {
    item_name: String,
    quantity: f64,
    unit: String,
    alt_qty: f64,
    alt_unit: String,
    batch_no: String,
    mfg_date: String,
    exp_date: String,
    hsn_code: String,
    money: LineMoney,
}

/// Parse a sanitized inventory-voucher response. `type_label` is only
/// used for logging.
#[must_use]
pub fn parse_inventory_vouchers(
    xml_content: &str,
    company_name: &str,
    type_label: &str,
) -> Vec<InventoryVoucherRow> {
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
        emit_voucher_rows(voucher, company_name, &extractor, &mut rows);
    }

    info!("parsed {} rows for {type_label} [{company_name}]", rows.len());
    rows
}

fn emit_voucher_rows(
    voucher: &Element,
    company_name: &str,
    extractor: &CurrencyExtractor,
    rows: &mut Vec<InventoryVoucherRow>,
) {
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
    let party_name = clean_text(&voucher.child_text_or("PARTYNAME", ""));
    let reference = clean_text(&voucher.child_text_or("REFERENCE", ""));
    let narration = clean_text(&voucher.child_text_or("NARRATION", ""));
    let gst_number = clean_text(&voucher.child_text_or("PARTYGSTIN", ""));
    let e_invoice_number = clean_text(&voucher.child_text_or("IRNACKNO", ""));
    let eway_bill = clean_text(&voucher.child_text_or("TEMPGSTEWAYBILLNUMBER", ""));

    let (change_status, is_deleted) = change_status_of(
        voucher.attr("ACTION"),
        &voucher.child_text_or("ISDELETED", "No"),
    );

    let ledger_entries = entries_of(voucher, "ALLLEDGERENTRIES.LIST", "LEDGERENTRIES.LIST");
    let inventory_entries =
        entries_of(voucher, "ALLINVENTORYENTRIES.LIST", "INVENTORYENTRIES.LIST");

    let base = InventoryVoucherRow {
        company_name: company_name.to_string(),
        date,
        voucher_number,
        reference,
        voucher_type,
        party_name: party_name.clone(),
        gst_number,
        e_invoice_number,
        eway_bill,
        narration,
        guid,
        alter_id,
        master_id,
        change_status,
        is_deleted,
        currency: "INR".to_string(),
        exchange_rate: 1.0,
        ..InventoryVoucherRow::default()
    };

    // Deleted vouchers from CDC arrive with no entries; a single stub row
    // lets the writer mark every stored row for this guid deleted.
    if is_deleted && ledger_entries.is_empty() && inventory_entries.is_empty() {
        rows.push(base);
        return;
    }

    // Voucher-level currency scan: ledger entries first, inventory
    // entries as the fallback.
    let mut voucher_currency = "INR".to_string();
    let mut voucher_rate = 1.0_f64;
    for entry in &ledger_entries {
        let amount_text = clean_text(&entry.child_text_or("AMOUNT", "0"));
        let money = extractor.line_money(None, Some(&amount_text), None);
        if money.is_foreign() {
            voucher_currency = money.currency;
            voucher_rate = money.exchange_rate;
            break;
        }
    }
    if voucher_rate == 1.0 {
        for entry in &inventory_entries {
            let rate_text = clean_text(&entry.child_text_or("RATE", "0"));
            let amount_text = clean_text(&entry.child_text_or("AMOUNT", "0"));
            let money = extractor.line_money(Some(&rate_text), Some(&amount_text), None);
            if money.is_foreign() {
                voucher_currency = money.currency;
                voucher_rate = money.exchange_rate;
                break;
            }
        }
    }

    let (gst, charges) = classify_ledger_entries(&ledger_entries, &party_name);
    let gst_rate = gst.cgst_rate + gst.sgst_rate + gst.igst_rate;
    let gst_total = gst.cgst_total + gst.sgst_total + gst.igst_total;

    let has_real_inventory = inventory_entries.iter().any(|entry| {
        let item_name = clean_text(&entry.child_text_or("STOCKITEMNAME", ""));
        let amount = numeric_amount(&clean_text(&entry.child_text_or("AMOUNT", "0")));
        !item_name.is_empty() && amount > 0.01
    });

    let mut items = Vec::new();
    let mut total_item_amount = 0.0_f64;
    if has_real_inventory {
        for entry in &inventory_entries {
            let item = line_item(entry, extractor, voucher_rate, &voucher_currency);
            total_item_amount += item.money.amount;
            items.push(item);
        }
    }

    if items.is_empty() || total_item_amount == 0.0 {
        // No priced inventory lines: one aggregate row keeps the tax and
        // charge buckets visible for reporting.
        rows.push(InventoryVoucherRow {
            item_name: "No Item".to_string(),
            unit: "No Unit".to_string(),
            gst_rate,
            cgst_amt: gst.cgst_total,
            sgst_amt: gst.sgst_total,
            igst_amt: gst.igst_total,
            freight_amt: charges.freight_amt,
            dca_amt: charges.dca_amt,
            cf_amt: charges.cf_amt,
            other_amt: charges.other_amt,
            total_amt: gst_total + charges.total(),
            currency: voucher_currency,
            exchange_rate: voucher_rate,
            ..base
        });
        return;
    }

    let voucher_total = total_item_amount + gst_total + charges.total();
    for item in items {
        let proportion = item.money.amount / total_item_amount;
        rows.push(InventoryVoucherRow {
            item_name: item.item_name,
            quantity: item.quantity,
            unit: item.unit,
            alt_qty: item.alt_qty,
            alt_unit: item.alt_unit,
            batch_no: item.batch_no,
            mfg_date: item.mfg_date,
            exp_date: item.exp_date,
            hsn_code: item.hsn_code,
            gst_rate,
            rate: item.money.rate,
            amount: item.money.amount,
            discount: item.money.discount,
            cgst_amt: gst.cgst_total * proportion,
            sgst_amt: gst.sgst_total * proportion,
            igst_amt: gst.igst_total * proportion,
            freight_amt: charges.freight_amt,
            dca_amt: charges.dca_amt,
            cf_amt: charges.cf_amt,
            other_amt: charges.other_amt,
            total_amt: voucher_total,
            currency: item.money.currency,
            exchange_rate: item.money.exchange_rate,
            ..base.clone()
        });
    }
}

fn entries_of<'a>(voucher: &'a Element, preferred: &str, fallback: &str) -> Vec<&'a Element> {
    let entries = voucher.descendants(preferred);
    if entries.is_empty() {
        voucher.descendants(fallback)
    } else {
        entries
    }
}

/// Classify ledger entries into GST and ancillary-charge buckets by
/// ledger name. The GST families require both the tax token and a
/// direction token so party ledgers named after the tax don't count.
fn classify_ledger_entries(entries: &[&Element], party_name: &str) -> (GstBuckets, ChargeBuckets) {
    let mut gst = GstBuckets::default();
    let mut charges = ChargeBuckets::default();

    for entry in entries {
        let ledger_name = clean_text(&entry.child_text_or("LEDGERNAME", ""));
        let amount_text = clean_text(&entry.child_text_or("AMOUNT", "0"));
        let amount = numeric_amount(&amount_text);
        let directional = GST_DIRECTION.is_match(&ledger_name);

        if CGST.is_match(&ledger_name) && directional {
            gst.cgst_total += amount;
            if gst.cgst_rate == 0.0 {
                gst.cgst_rate = rate_from_name(&ledger_name);
            }
        } else if SGST.is_match(&ledger_name) && directional {
            gst.sgst_total += amount;
            if gst.sgst_rate == 0.0 {
                gst.sgst_rate = rate_from_name(&ledger_name);
            }
        } else if IGST.is_match(&ledger_name) && directional {
            gst.igst_total += amount;
            if gst.igst_rate == 0.0 {
                gst.igst_rate = rate_from_name(&ledger_name);
            }
        } else if FREIGHT.is_match(&ledger_name) {
            charges.freight_amt += amount;
        } else if DCA.is_match(&ledger_name) {
            charges.dca_amt += amount;
        } else if CLEARING_FORWARDING.is_match(&ledger_name) {
            charges.cf_amt += amount;
        } else if !ledger_name.is_empty()
            && ledger_name != party_name
            && amount > 0.01
            && !ROUNDING.is_match(&ledger_name)
        {
            let is_gst = (CGST.is_match(&ledger_name)
                || SGST.is_match(&ledger_name)
                || IGST.is_match(&ledger_name))
                && directional;
            if !is_gst && !DUTY_OR_CESS.is_match(&ledger_name) {
                charges.other_amt += amount;
            }
        }
    }

    (gst, charges)
}

/// First-seen `@ NN%` suffix on a GST ledger name.
fn rate_from_name(ledger_name: &str) -> f64 {
    GST_RATE_SUFFIX
        .captures(ledger_name)
        .and_then(|caps| caps.get(1))
        .and_then(|group| group.as_str().parse::<f64>().ok())
        .map(f64::abs)
        .unwrap_or(0.0)
}

fn line_item(
    entry: &Element,
    extractor: &CurrencyExtractor,
    voucher_rate: f64,
    voucher_currency: &str,
) -> LineItem {
    let item_name = clean_text(&entry.child_text_or("STOCKITEMNAME", ""));
    let qty_text = clean_text(&entry.child_text_or("ACTUALQTY", "0"));
    let rate_text = clean_text(&entry.child_text_or("RATE", "0"));
    let amount_text = clean_text(&entry.child_text_or("AMOUNT", "0"));
    let discount_text = clean_text(&entry.child_text_or("DISCOUNT", "0"));
    let billed_qty = clean_text(&entry.child_text_or("BILLEDQTY", "0"));

    let unit = extract_unit_from_rate(&rate_text);
    let (alt_qty, alt_unit) = parse_quantity_with_unit(&billed_qty);

    let mut batch_no = String::new();
    let mut mfg_date = String::new();
    let mut exp_date = String::new();
    if let Some(batch) = entry.descendants("BATCHALLOCATIONS.LIST").first() {
        batch_no = clean_text(&batch.child_text_or("BATCHNAME", ""));
        let mfg_raw = clean_text(&batch.child_text_or("MFDON", ""));
        if !mfg_raw.is_empty() {
            mfg_date = format_business_date(&mfg_raw);
        }
        if let Some(expiry) = batch.child("EXPIRYPERIOD") {
            let text = expiry.text();
            if !text.is_empty() {
                exp_date = parse_expiry_date(&text);
            }
            // Some releases publish the expiry only as a Julian-date
            // attribute.
            if exp_date.is_empty()
                && let Some(jd) = expiry.attr("JD")
            {
                exp_date = format_business_date(jd);
            }
        }
    }

    let mut hsn_code = String::new();
    for alloc in entry.descendants("ACCOUNTINGALLOCATIONS.LIST") {
        hsn_code = clean_text(&alloc.child_text_or("GSTHSNSACCODE", ""));
        if !hsn_code.is_empty() {
            break;
        }
    }

    let mut money = extractor.line_money(Some(&rate_text), Some(&amount_text), Some(&discount_text));
    if money.exchange_rate == 1.0 && voucher_rate > 1.0 {
        money.exchange_rate = voucher_rate;
        money.currency = voucher_currency.to_string();
    }

    LineItem {
        item_name,
        quantity: numeric_amount(&qty_text),
        unit,
        alt_qty,
        alt_unit,
        batch_no,
        mfg_date,
        exp_date,
        hsn_code,
        money,
    }
}
