#![deny(clippy::print_stdout, clippy::print_stderr)]

use std::fmt::Display;
use std::str::FromStr;

use chrono::NaiveDate;
use thiserror::Error;

mod company;
mod currency;
mod inventory;
mod ledger_master;
mod ledger_voucher;
mod text;
mod trial_balance;
pub mod xml;

pub use company::parse_companies;
pub use currency::CurrencyExtractor;
pub use currency::ForeignCurrencyDetails;
pub use currency::LineMoney;
pub use inventory::parse_inventory_vouchers;
pub use ledger_master::parse_ledgers;
pub use ledger_voucher::parse_ledger_vouchers;
pub use text::clean_text;
pub use text::parse_business_date;
pub use trial_balance::parse_trial_balance;

pub type IngestResult<T> = Result<T, IngestError>;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed xml: {0}")]
    Xml(String),
    #[error("invalid payload: {0}")]
    Invalid(String),
}

/// The eight transactional voucher kinds the upstream exposes. Masters
/// (ledgers) and the trial balance are fetched separately and are not
/// voucher kinds, though they share the same watermark table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoucherKind {
    Sales,
    Purchase,
    CreditNote,
    DebitNote,
    Receipt,
    Payment,
    Journal,
    Contra,
}

/// Row shape a voucher kind denormalizes into: one row per inventory
/// line item, or one row per ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoucherShape {
    Inventory,
    Ledger,
}

impl VoucherKind {
    pub const ALL: [VoucherKind; 8] = [
        VoucherKind::Sales,
        VoucherKind::Purchase,
        VoucherKind::CreditNote,
        VoucherKind::DebitNote,
        VoucherKind::Receipt,
        VoucherKind::Payment,
        VoucherKind::Journal,
        VoucherKind::Contra,
    ];

    #[must_use]
    pub fn shape(self) -> VoucherShape {
        match self {
            VoucherKind::Sales
            | VoucherKind::Purchase
            | VoucherKind::CreditNote
            | VoucherKind::DebitNote => VoucherShape::Inventory,
            VoucherKind::Receipt
            | VoucherKind::Payment
            | VoucherKind::Journal
            | VoucherKind::Contra => VoucherShape::Ledger,
        }
    }

    /// Stable key used for watermark rows and configuration.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            VoucherKind::Sales => "sales",
            VoucherKind::Purchase => "purchase",
            VoucherKind::CreditNote => "credit_note",
            VoucherKind::DebitNote => "debit_note",
            VoucherKind::Receipt => "receipt",
            VoucherKind::Payment => "payment",
            VoucherKind::Journal => "journal",
            VoucherKind::Contra => "contra",
        }
    }

    /// Human-facing label used in logs and progress events.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            VoucherKind::Sales => "Sales Vouchers",
            VoucherKind::Purchase => "Purchase Vouchers",
            VoucherKind::CreditNote => "Credit Note",
            VoucherKind::DebitNote => "Debit Note",
            VoucherKind::Receipt => "Receipt Vouchers",
            VoucherKind::Payment => "Payment Vouchers",
            VoucherKind::Journal => "Journal Vouchers",
            VoucherKind::Contra => "Contra Vouchers",
        }
    }

    /// Warehouse table the kind denormalizes into.
    #[must_use]
    pub fn table(self) -> &'static str {
        match self {
            VoucherKind::Sales => "sales_vouchers",
            VoucherKind::Purchase => "purchase_vouchers",
            VoucherKind::CreditNote => "credit_notes",
            VoucherKind::DebitNote => "debit_notes",
            VoucherKind::Receipt => "receipt_vouchers",
            VoucherKind::Payment => "payment_vouchers",
            VoucherKind::Journal => "journal_vouchers",
            VoucherKind::Contra => "contra_vouchers",
        }
    }
}

impl Display for VoucherKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for VoucherKind {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        VoucherKind::ALL
            .into_iter()
            .find(|kind| kind.key() == value)
            .ok_or_else(|| IngestError::Invalid(format!("unknown voucher kind {value}")))
    }
}

/// Debit/credit leg of a ledger-voucher entry. The upstream encodes the
/// side as the sign of the raw amount text; rows store the absolute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountType {
    Debit,
    Credit,
}

impl AmountType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AmountType::Debit => "Debit",
            AmountType::Credit => "Credit",
        }
    }
}

/// A ledger master record, one per (company, guid).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerRow {
    pub company_name: String,
    pub ledger_name: String,
    pub alias: String,
    pub alias_2: String,
    pub alias_3: String,
    pub parent_group: String,
    pub contact_person: String,
    pub email: String,
    pub phone: String,
    pub mobile: String,
    pub fax: String,
    pub website: String,
    pub address_line_1: String,
    pub address_line_2: String,
    pub address_line_3: String,
    pub pincode: String,
    pub state: String,
    pub country: String,
    pub opening_balance: String,
    pub credit_limit: String,
    pub bill_credit_period: String,
    pub pan: String,
    pub gstin: String,
    pub gst_registration_type: String,
    pub vat_tin: String,
    pub sales_tax_number: String,
    pub bank_account_holder: String,
    pub ifsc_code: String,
    pub bank_branch: String,
    pub swift_code: String,
    pub bank_iban: String,
    pub export_import_code: String,
    pub msme_reg_number: String,
    pub is_bill_wise_on: String,
    pub is_deleted: bool,
    pub created_date: String,
    pub altered_on: String,
    pub guid: String,
    pub alter_id: i64,
}

/// One denormalized line item of a sales/purchase/credit-note/debit-note
/// voucher. Tax buckets are apportioned by line-amount weight; ancillary
/// charges are copied verbatim on every line and summed once in
/// `total_amt`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InventoryVoucherRow {
    pub company_name: String,
    pub date: Option<NaiveDate>,
    pub voucher_number: String,
    pub reference: String,
    pub voucher_type: String,
    pub party_name: String,
    pub gst_number: String,
    pub e_invoice_number: String,
    pub eway_bill: String,
    pub item_name: String,
    pub quantity: f64,
    pub unit: String,
    pub alt_qty: f64,
    pub alt_unit: String,
    pub batch_no: String,
    pub mfg_date: String,
    pub exp_date: String,
    pub hsn_code: String,
    pub gst_rate: f64,
    pub rate: f64,
    pub amount: f64,
    pub discount: f64,
    pub cgst_amt: f64,
    pub sgst_amt: f64,
    pub igst_amt: f64,
    pub freight_amt: f64,
    pub dca_amt: f64,
    pub cf_amt: f64,
    pub other_amt: f64,
    pub total_amt: f64,
    pub currency: String,
    pub exchange_rate: f64,
    pub narration: String,
    pub guid: String,
    pub alter_id: i64,
    pub master_id: String,
    pub change_status: String,
    pub is_deleted: bool,
}

/// One ledger entry of a receipt/payment/journal/contra voucher.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerVoucherRow {
    pub company_name: String,
    pub date: Option<NaiveDate>,
    pub voucher_type: String,
    pub voucher_number: String,
    pub reference: String,
    pub ledger_name: String,
    pub amount: f64,
    pub amount_type: Option<AmountType>,
    pub currency: String,
    pub exchange_rate: f64,
    pub narration: String,
    pub guid: String,
    pub alter_id: i64,
    pub master_id: String,
    pub change_status: String,
    pub is_deleted: bool,
}

/// Trial balance per (company, ledger, period).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialBalanceRow {
    pub company_name: String,
    pub ledger_name: String,
    pub parent_group: String,
    pub opening_balance: f64,
    pub net_transactions: f64,
    pub closing_balance: f64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub guid: String,
    pub alter_id: i64,
    pub master_id: String,
}

/// A tenant as advertised by the upstream company list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompanyRecord {
    pub guid: String,
    pub name: String,
    pub formal_name: String,
    pub company_number: String,
    pub starting_from: Option<NaiveDate>,
    pub books_from: Option<NaiveDate>,
    pub audited_upto: Option<NaiveDate>,
}

/// Parsed rows of one voucher response; the shape follows the kind.
/// Writers dispatch on the variant instead of a table discriminator.
#[derive(Debug, Clone, PartialEq)]
pub enum VoucherRows {
    Inventory(Vec<InventoryVoucherRow>),
    Ledger(Vec<LedgerVoucherRow>),
}

impl VoucherRows {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            VoucherRows::Inventory(rows) => rows.len(),
            VoucherRows::Ledger(rows) => rows.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest alter id in the batch; the CDC watermark advances to it.
    #[must_use]
    pub fn max_alter_id(&self) -> i64 {
        match self {
            VoucherRows::Inventory(rows) => {
                rows.iter().map(|row| row.alter_id).max().unwrap_or(0)
            }
            VoucherRows::Ledger(rows) => rows.iter().map(|row| row.alter_id).max().unwrap_or(0),
        }
    }
}

/// Parse a sanitized voucher response into the row shape of its kind.
#[must_use]
pub fn parse_vouchers(kind: VoucherKind, xml_content: &str, company_name: &str) -> VoucherRows {
    match kind.shape() {
        VoucherShape::Inventory => VoucherRows::Inventory(parse_inventory_vouchers(
            xml_content,
            company_name,
            kind.label(),
        )),
        VoucherShape::Ledger => VoucherRows::Ledger(parse_ledger_vouchers(
            xml_content,
            company_name,
            kind.label(),
        )),
    }
}

impl InventoryVoucherRow {
    /// Stub rows are the single row emitted for a deleted voucher that
    /// arrives without line entries; the writer fans the soft delete out
    /// over all previously stored rows sharing the guid.
    #[must_use]
    pub fn is_deletion_stub(&self) -> bool {
        self.is_deleted && self.item_name.is_empty()
    }
}

impl LedgerVoucherRow {
    #[must_use]
    pub fn is_deletion_stub(&self) -> bool {
        self.is_deleted && self.ledger_name.is_empty()
    }
}

pub(crate) fn is_delete_status(change_status: &str) -> bool {
    matches!(change_status, "Deleted" | "Delete")
}

/// Derive the CDC status of a record from the `ACTION` attribute and the
/// `ISDELETED` element. Deletion wins over whatever the action says.
pub(crate) fn change_status_of(action: Option<&str>, is_deleted_text: &str) -> (String, bool) {
    let status = if is_deleted_text == "Yes" {
        "Deleted".to_string()
    } else {
        action.unwrap_or("Unknown").to_string()
    };
    let deleted = is_delete_status(&status);
    (status, deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn voucher_kind_round_trips_through_key() {
        for kind in VoucherKind::ALL {
            assert_eq!(kind.key().parse::<VoucherKind>().expect("known key"), kind);
        }
    }

    #[test]
    fn voucher_kind_shapes_split_four_four() {
        let inventory = VoucherKind::ALL
            .into_iter()
            .filter(|kind| kind.shape() == VoucherShape::Inventory)
            .count();
        assert_eq!(inventory, 4);
    }

    #[test]
    fn change_status_prefers_deletion() {
        let (status, deleted) = change_status_of(Some("Alter"), "Yes");
        assert_eq!(status, "Deleted");
        assert!(deleted);

        let (status, deleted) = change_status_of(Some("Create"), "No");
        assert_eq!(status, "Create");
        assert!(!deleted);

        let (status, deleted) = change_status_of(None, "No");
        assert_eq!(status, "Unknown");
        assert!(!deleted);
    }
}
