//! Create-if-absent DDL. Schema evolution beyond this is out of scope;
//! operators run migrations out of band if they ever change a table.

pub(crate) const CREATE_COMPANIES: &str = r"
CREATE TABLE IF NOT EXISTS companies (
    guid           VARCHAR(255) NOT NULL,
    name           VARCHAR(255) NOT NULL,
    formal_name    VARCHAR(255) NULL,
    company_number VARCHAR(20)  NULL,
    starting_from  DATE         NULL,
    books_from     DATE         NULL,
    audited_upto   DATE         NULL,
    tally_host     VARCHAR(255) NULL,
    tally_port     INT          NULL,
    is_active      TINYINT(1)   NOT NULL DEFAULT 1,
    created_at     DATETIME     NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at     DATETIME     NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
    PRIMARY KEY (name),
    INDEX idx_companies_guid (guid)
) CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci
";

pub(crate) const CREATE_SYNC_STATE: &str = r"
CREATE TABLE IF NOT EXISTS sync_state (
    company_name      VARCHAR(255) NOT NULL,
    voucher_type      VARCHAR(100) NOT NULL,
    last_alter_id     BIGINT       NOT NULL DEFAULT 0,
    is_initial_done   TINYINT(1)   NOT NULL DEFAULT 0,
    last_synced_month VARCHAR(6)   NULL,
    last_sync_time    DATETIME     NULL,
    created_at        DATETIME     NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at        DATETIME     NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
    PRIMARY KEY (company_name, voucher_type)
) CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci
";

pub(crate) const CREATE_LEDGERS: &str = r"
CREATE TABLE IF NOT EXISTS ledgers (
    id                    BIGINT       NOT NULL AUTO_INCREMENT,
    company_name          VARCHAR(255) NOT NULL,
    ledger_name           VARCHAR(255) NOT NULL,
    alias                 VARCHAR(255) NULL,
    alias_2               VARCHAR(255) NULL,
    alias_3               VARCHAR(255) NULL,
    parent_group          VARCHAR(255) NULL,
    contact_person        VARCHAR(255) NULL,
    email                 VARCHAR(255) NULL,
    phone                 VARCHAR(100) NULL,
    mobile                VARCHAR(100) NULL,
    fax                   VARCHAR(100) NULL,
    website               VARCHAR(500) NULL,
    address_line_1        TEXT         NULL,
    address_line_2        TEXT         NULL,
    address_line_3        TEXT         NULL,
    pincode               VARCHAR(100) NULL,
    state                 VARCHAR(255) NULL,
    country               VARCHAR(255) NULL,
    opening_balance       VARCHAR(100) NULL,
    credit_limit          VARCHAR(100) NULL,
    bill_credit_period    VARCHAR(100) NULL,
    pan                   VARCHAR(100) NULL,
    gstin                 VARCHAR(100) NULL,
    gst_registration_type VARCHAR(255) NULL,
    vat_tin               VARCHAR(100) NULL,
    sales_tax_number      VARCHAR(100) NULL,
    bank_account_holder   VARCHAR(255) NULL,
    ifsc_code             VARCHAR(100) NULL,
    bank_branch           VARCHAR(255) NULL,
    swift_code            VARCHAR(100) NULL,
    bank_iban             VARCHAR(100) NULL,
    export_import_code    VARCHAR(100) NULL,
    msme_reg_number       VARCHAR(100) NULL,
    is_bill_wise_on       VARCHAR(10)  NULL,
    is_deleted            VARCHAR(10)  NOT NULL DEFAULT 'No',
    created_date          VARCHAR(20)  NULL,
    altered_on            VARCHAR(20)  NULL,
    guid                  VARCHAR(255) NOT NULL,
    alter_id              BIGINT       NOT NULL DEFAULT 0,
    created_at            DATETIME     NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at            DATETIME     NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
    PRIMARY KEY (id),
    UNIQUE KEY uq_ledgers_company_guid (company_name, guid),
    INDEX idx_ledgers_name (ledger_name),
    INDEX idx_ledgers_gstin (gstin)
) CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci
";

pub(crate) const CREATE_TRIAL_BALANCE: &str = r"
CREATE TABLE IF NOT EXISTS trial_balance (
    id               BIGINT       NOT NULL AUTO_INCREMENT,
    company_name     VARCHAR(255) NOT NULL,
    ledger_name      VARCHAR(255) NOT NULL,
    parent_group     VARCHAR(255) NULL,
    opening_balance  DOUBLE       NULL DEFAULT 0,
    net_transactions DOUBLE       NULL DEFAULT 0,
    closing_balance  DOUBLE       NULL DEFAULT 0,
    start_date       DATE         NULL,
    end_date         DATE         NULL,
    guid             VARCHAR(255) NOT NULL,
    alter_id         BIGINT       NOT NULL DEFAULT 0,
    master_id        VARCHAR(255) NULL,
    created_at       DATETIME     NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at       DATETIME     NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
    PRIMARY KEY (id),
    UNIQUE KEY uq_tb_company_ledger_period (company_name, ledger_name, start_date, end_date),
    INDEX idx_tb_guid (guid)
) CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci
";

/// Sales, purchase, credit-note and debit-note tables share this shape:
/// one row per denormalized line item.
pub(crate) fn create_inventory_voucher_table(table: &str) -> String {
    format!(
        r"
CREATE TABLE IF NOT EXISTS {table} (
    id               BIGINT       NOT NULL AUTO_INCREMENT,
    company_name     VARCHAR(255) NOT NULL,
    date             DATE         NULL,
    voucher_number   VARCHAR(100) NULL,
    reference        VARCHAR(255) NULL,
    voucher_type     VARCHAR(100) NULL,
    party_name       VARCHAR(255) NULL,
    gst_number       VARCHAR(50)  NULL,
    e_invoice_number VARCHAR(255) NULL,
    eway_bill        VARCHAR(255) NULL,
    item_name        VARCHAR(255) NULL,
    quantity         DOUBLE       NULL DEFAULT 0,
    unit             VARCHAR(50)  NULL,
    alt_qty          DOUBLE       NULL DEFAULT 0,
    alt_unit         VARCHAR(50)  NULL,
    batch_no         VARCHAR(255) NULL,
    mfg_date         VARCHAR(20)  NULL,
    exp_date         VARCHAR(20)  NULL,
    hsn_code         VARCHAR(50)  NULL,
    gst_rate         DOUBLE       NULL DEFAULT 0,
    rate             DOUBLE       NULL DEFAULT 0,
    amount           DOUBLE       NULL DEFAULT 0,
    discount         DOUBLE       NULL DEFAULT 0,
    cgst_amt         DOUBLE       NULL DEFAULT 0,
    sgst_amt         DOUBLE       NULL DEFAULT 0,
    igst_amt         DOUBLE       NULL DEFAULT 0,
    freight_amt      DOUBLE       NULL DEFAULT 0,
    dca_amt          DOUBLE       NULL DEFAULT 0,
    cf_amt           DOUBLE       NULL DEFAULT 0,
    other_amt        DOUBLE       NULL DEFAULT 0,
    total_amt        DOUBLE       NULL DEFAULT 0,
    currency         VARCHAR(10)  NULL DEFAULT 'INR',
    exchange_rate    DOUBLE       NULL DEFAULT 1,
    narration        TEXT         NULL,
    guid             VARCHAR(255) NOT NULL,
    alter_id         BIGINT       NOT NULL DEFAULT 0,
    master_id        VARCHAR(255) NULL,
    change_status    VARCHAR(50)  NULL,
    is_deleted       VARCHAR(3)   NOT NULL DEFAULT 'No',
    created_at       DATETIME     NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at       DATETIME     NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
    PRIMARY KEY (id),
    INDEX idx_{table}_company_date (company_name, date),
    INDEX idx_{table}_guid (guid),
    INDEX idx_{table}_alter_id (alter_id),
    INDEX idx_{table}_party (party_name)
) CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci
"
    )
}

/// Receipt, payment, journal and contra tables share this shape: one row
/// per ledger entry.
pub(crate) fn create_ledger_voucher_table(table: &str) -> String {
    format!(
        r"
CREATE TABLE IF NOT EXISTS {table} (
    id             BIGINT       NOT NULL AUTO_INCREMENT,
    company_name   VARCHAR(255) NOT NULL,
    date           DATE         NULL,
    voucher_type   VARCHAR(100) NULL,
    voucher_number VARCHAR(100) NULL,
    reference      VARCHAR(255) NULL,
    ledger_name    VARCHAR(255) NULL,
    amount         DOUBLE       NULL DEFAULT 0,
    amount_type    VARCHAR(10)  NULL,
    currency       VARCHAR(10)  NULL DEFAULT 'INR',
    exchange_rate  DOUBLE       NULL DEFAULT 1,
    narration      TEXT         NULL,
    guid           VARCHAR(255) NOT NULL,
    alter_id       BIGINT       NOT NULL DEFAULT 0,
    master_id      VARCHAR(255) NULL,
    change_status  VARCHAR(50)  NULL,
    is_deleted     VARCHAR(3)   NOT NULL DEFAULT 'No',
    created_at     DATETIME     NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at     DATETIME     NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
    PRIMARY KEY (id),
    INDEX idx_{table}_company_date (company_name, date),
    INDEX idx_{table}_guid (guid),
    INDEX idx_{table}_alter_id (alter_id),
    INDEX idx_{table}_ledger (ledger_name)
) CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci
"
    )
}
