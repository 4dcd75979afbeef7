//! MySQL-backed warehouse over a shared `sqlx` pool.
//!
//! Upserts follow a read-then-write flow inside one transaction per
//! batch: the unique keys make duplicate inserts impossible, and the
//! alter-id comparison keeps re-runs idempotent. A rollback leaves the
//! watermark untouched, so the same chunk is refetched on the next run.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use chrono::TimeZone;
use chrono::Utc;
use sqlx::Connection;
use sqlx::MySql;
use sqlx::MySqlPool;
use sqlx::Row;
use sqlx::Transaction;
use sqlx::mysql::MySqlConnectOptions;
use sqlx::mysql::MySqlConnection;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::mysql::MySqlRow;
use tally_ingest::CompanyRecord;
use tally_ingest::InventoryVoucherRow;
use tally_ingest::LedgerRow;
use tally_ingest::LedgerVoucherRow;
use tally_ingest::TrialBalanceRow;
use tally_ingest::VoucherKind;
use tally_ingest::VoucherRows;
use tracing::debug;
use tracing::info;

use crate::CompanyImportStats;
use crate::StoredCompany;
use crate::SyncState;
use crate::Warehouse;
use crate::WarehouseError;
use crate::WarehouseResult;
use crate::schema;

#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    /// Must sustain one transaction per voucher worker plus scheduler
    /// overhead.
    pub pool_size: u32,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            username: "root".to_string(),
            password: String::new(),
            database: "tally_cdc".to_string(),
            pool_size: 10,
        }
    }
}

impl WarehouseConfig {
    fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(&self.password)
    }
}

pub struct SqlWarehouse {
    pool: MySqlPool,
}

impl SqlWarehouse {
    /// Create the database and tables if absent, then open the shared
    /// pool. Fails fast on bad credentials.
    pub async fn connect(config: &WarehouseConfig) -> WarehouseResult<Self> {
        create_database_if_absent(config).await?;
        let pool = MySqlPoolOptions::new()
            .max_connections(config.pool_size)
            .connect_with(config.connect_options().database(&config.database))
            .await?;
        let warehouse = Self { pool };
        warehouse.create_tables().await?;
        info!("warehouse ready: {}@{}", config.database, config.host);
        Ok(warehouse)
    }

    #[must_use]
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub async fn create_tables(&self) -> WarehouseResult<()> {
        let mut statements = vec![
            schema::CREATE_COMPANIES.to_string(),
            schema::CREATE_SYNC_STATE.to_string(),
            schema::CREATE_LEDGERS.to_string(),
            schema::CREATE_TRIAL_BALANCE.to_string(),
        ];
        for kind in VoucherKind::ALL {
            let table = kind.table();
            statements.push(match kind.shape() {
                tally_ingest::VoucherShape::Inventory => {
                    schema::create_inventory_voucher_table(table)
                }
                tally_ingest::VoucherShape::Ledger => schema::create_ledger_voucher_table(table),
            });
        }
        for statement in statements {
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        debug!("warehouse tables ensured");
        Ok(())
    }
}

async fn create_database_if_absent(config: &WarehouseConfig) -> WarehouseResult<()> {
    if !config
        .database
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
    {
        return Err(WarehouseError::Validation(format!(
            "invalid database name {}",
            config.database
        )));
    }
    let mut connection = MySqlConnection::connect_with(&config.connect_options()).await?;
    sqlx::query(&format!(
        "CREATE DATABASE IF NOT EXISTS `{}` CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci",
        config.database
    ))
    .execute(&mut connection)
    .await?;
    connection.close().await?;
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value { "Yes" } else { "No" }
}

fn company_from_row(row: &MySqlRow) -> WarehouseResult<StoredCompany> {
    Ok(StoredCompany {
        guid: row.try_get("guid")?,
        name: row.try_get("name")?,
        formal_name: row.try_get::<Option<String>, _>("formal_name")?.unwrap_or_default(),
        company_number: row
            .try_get::<Option<String>, _>("company_number")?
            .unwrap_or_default(),
        starting_from: row.try_get("starting_from")?,
        books_from: row.try_get("books_from")?,
        audited_upto: row.try_get("audited_upto")?,
        tally_host: row.try_get("tally_host")?,
        tally_port: row
            .try_get::<Option<i32>, _>("tally_port")?
            .and_then(|port| u16::try_from(port).ok()),
        is_active: row.try_get("is_active")?,
    })
}

/// Group rows by guid preserving first-seen order. Every row of a
/// voucher shares one guid, so a group is one voucher.
fn guid_order<'a, R, F: Fn(&'a R) -> &'a str>(rows: &'a [R], guid_of: F) -> Vec<&'a str> {
    let mut order: Vec<&str> = Vec::new();
    for row in rows {
        let guid = guid_of(row);
        if !order.contains(&guid) {
            order.push(guid);
        }
    }
    order
}

async fn stored_alter_id(
    tx: &mut Transaction<'_, MySql>,
    table: &str,
    company_name: &str,
    guid: &str,
) -> WarehouseResult<Option<i64>> {
    let row = sqlx::query(&format!(
        "SELECT MAX(alter_id) FROM {table} WHERE company_name = ? AND guid = ?"
    ))
    .bind(company_name)
    .bind(guid)
    .fetch_one(&mut **tx)
    .await?;
    Ok(row.try_get::<Option<i64>, _>(0)?)
}

async fn soft_delete_guid(
    tx: &mut Transaction<'_, MySql>,
    table: &str,
    company_name: &str,
    guid: &str,
    change_status: &str,
    alter_id: i64,
) -> WarehouseResult<u64> {
    let result = sqlx::query(&format!(
        "UPDATE {table} SET is_deleted = 'Yes', change_status = ?, \
         alter_id = GREATEST(alter_id, ?) WHERE company_name = ? AND guid = ?"
    ))
    .bind(change_status)
    .bind(alter_id)
    .bind(company_name)
    .bind(guid)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

async fn delete_guid(
    tx: &mut Transaction<'_, MySql>,
    table: &str,
    company_name: &str,
    guid: &str,
) -> WarehouseResult<()> {
    sqlx::query(&format!(
        "DELETE FROM {table} WHERE company_name = ? AND guid = ?"
    ))
    .bind(company_name)
    .bind(guid)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_inventory_row(
    tx: &mut Transaction<'_, MySql>,
    table: &str,
    row: &InventoryVoucherRow,
) -> WarehouseResult<()> {
    sqlx::query(&format!(
        "INSERT INTO {table} (company_name, date, voucher_number, reference, voucher_type, \
         party_name, gst_number, e_invoice_number, eway_bill, item_name, quantity, unit, \
         alt_qty, alt_unit, batch_no, mfg_date, exp_date, hsn_code, gst_rate, rate, amount, \
         discount, cgst_amt, sgst_amt, igst_amt, freight_amt, dca_amt, cf_amt, other_amt, \
         total_amt, currency, exchange_rate, narration, guid, alter_id, master_id, \
         change_status, is_deleted) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, \
         ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&row.company_name)
    .bind(row.date)
    .bind(&row.voucher_number)
    .bind(&row.reference)
    .bind(&row.voucher_type)
    .bind(&row.party_name)
    .bind(&row.gst_number)
    .bind(&row.e_invoice_number)
    .bind(&row.eway_bill)
    .bind(&row.item_name)
    .bind(row.quantity)
    .bind(&row.unit)
    .bind(row.alt_qty)
    .bind(&row.alt_unit)
    .bind(&row.batch_no)
    .bind(&row.mfg_date)
    .bind(&row.exp_date)
    .bind(&row.hsn_code)
    .bind(row.gst_rate)
    .bind(row.rate)
    .bind(row.amount)
    .bind(row.discount)
    .bind(row.cgst_amt)
    .bind(row.sgst_amt)
    .bind(row.igst_amt)
    .bind(row.freight_amt)
    .bind(row.dca_amt)
    .bind(row.cf_amt)
    .bind(row.other_amt)
    .bind(row.total_amt)
    .bind(&row.currency)
    .bind(row.exchange_rate)
    .bind(&row.narration)
    .bind(&row.guid)
    .bind(row.alter_id)
    .bind(&row.master_id)
    .bind(&row.change_status)
    .bind(yes_no(row.is_deleted))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_ledger_voucher_row(
    tx: &mut Transaction<'_, MySql>,
    table: &str,
    row: &LedgerVoucherRow,
) -> WarehouseResult<()> {
    sqlx::query(&format!(
        "INSERT INTO {table} (company_name, date, voucher_type, voucher_number, reference, \
         ledger_name, amount, amount_type, currency, exchange_rate, narration, guid, \
         alter_id, master_id, change_status, is_deleted) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&row.company_name)
    .bind(row.date)
    .bind(&row.voucher_type)
    .bind(&row.voucher_number)
    .bind(&row.reference)
    .bind(&row.ledger_name)
    .bind(row.amount)
    .bind(row.amount_type.map(|amount_type| amount_type.as_str()))
    .bind(&row.currency)
    .bind(row.exchange_rate)
    .bind(&row.narration)
    .bind(&row.guid)
    .bind(row.alter_id)
    .bind(&row.master_id)
    .bind(&row.change_status)
    .bind(yes_no(row.is_deleted))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_inventory_tx(
    tx: &mut Transaction<'_, MySql>,
    table: &str,
    rows: &[InventoryVoucherRow],
) -> WarehouseResult<u64> {
    let mut affected = 0;
    for guid in guid_order(rows, |row| row.guid.as_str()) {
        let group: Vec<&InventoryVoucherRow> =
            rows.iter().filter(|row| row.guid == guid).collect();
        let company_name = &group[0].company_name;
        let incoming = group.iter().map(|row| row.alter_id).max().unwrap_or(0);
        let stored = stored_alter_id(tx, table, company_name, guid).await?;
        let stub = group.len() == 1 && group[0].is_deletion_stub();

        if stub && stored.is_some() {
            affected += soft_delete_guid(
                tx,
                table,
                company_name,
                guid,
                &group[0].change_status,
                incoming,
            )
            .await?;
            continue;
        }
        match stored {
            None => {
                for row in &group {
                    insert_inventory_row(tx, table, row).await?;
                }
                affected += group.len() as u64;
            }
            Some(stored_alter) if incoming > stored_alter => {
                delete_guid(tx, table, company_name, guid).await?;
                for row in &group {
                    insert_inventory_row(tx, table, row).await?;
                }
                affected += group.len() as u64;
            }
            Some(_) => {}
        }
    }
    Ok(affected)
}

async fn upsert_ledger_voucher_tx(
    tx: &mut Transaction<'_, MySql>,
    table: &str,
    rows: &[LedgerVoucherRow],
) -> WarehouseResult<u64> {
    let mut affected = 0;
    for guid in guid_order(rows, |row| row.guid.as_str()) {
        let group: Vec<&LedgerVoucherRow> = rows.iter().filter(|row| row.guid == guid).collect();
        let company_name = &group[0].company_name;
        let incoming = group.iter().map(|row| row.alter_id).max().unwrap_or(0);
        let stored = stored_alter_id(tx, table, company_name, guid).await?;
        let stub = group.len() == 1 && group[0].is_deletion_stub();

        if stub && stored.is_some() {
            affected += soft_delete_guid(
                tx,
                table,
                company_name,
                guid,
                &group[0].change_status,
                incoming,
            )
            .await?;
            continue;
        }
        match stored {
            None => {
                for row in &group {
                    insert_ledger_voucher_row(tx, table, row).await?;
                }
                affected += group.len() as u64;
            }
            Some(stored_alter) if incoming > stored_alter => {
                delete_guid(tx, table, company_name, guid).await?;
                for row in &group {
                    insert_ledger_voucher_row(tx, table, row).await?;
                }
                affected += group.len() as u64;
            }
            Some(_) => {}
        }
    }
    Ok(affected)
}

async fn upsert_voucher_rows_tx(
    tx: &mut Transaction<'_, MySql>,
    kind: VoucherKind,
    rows: &VoucherRows,
) -> WarehouseResult<u64> {
    match rows {
        VoucherRows::Inventory(rows) => upsert_inventory_tx(tx, kind.table(), rows).await,
        VoucherRows::Ledger(rows) => upsert_ledger_voucher_tx(tx, kind.table(), rows).await,
    }
}

async fn advance_month_tx(
    tx: &mut Transaction<'_, MySql>,
    company_name: &str,
    kind: &str,
    month: &str,
) -> WarehouseResult<()> {
    sqlx::query(
        "INSERT INTO sync_state (company_name, voucher_type, last_alter_id, is_initial_done, \
         last_synced_month, last_sync_time) VALUES (?, ?, 0, FALSE, ?, UTC_TIMESTAMP()) \
         ON DUPLICATE KEY UPDATE last_synced_month = ?, last_sync_time = UTC_TIMESTAMP()",
    )
    .bind(company_name)
    .bind(kind)
    .bind(month)
    .bind(month)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl Warehouse for SqlWarehouse {
    async fn import_companies(
        &self,
        records: Vec<CompanyRecord>,
    ) -> WarehouseResult<CompanyImportStats> {
        let mut stats = CompanyImportStats::default();
        let mut tx = self.pool.begin().await?;
        for record in records {
            if record.guid.is_empty() || record.name.trim().is_empty() {
                stats.skipped += 1;
                continue;
            }
            let existing = sqlx::query("SELECT * FROM companies WHERE guid = ?")
                .bind(&record.guid)
                .fetch_optional(&mut *tx)
                .await?;
            match existing {
                Some(row) => {
                    let stored = company_from_row(&row)?;
                    let unchanged = stored.name == record.name
                        && stored.formal_name == record.formal_name
                        && stored.company_number == record.company_number
                        && stored.starting_from == record.starting_from
                        && stored.books_from == record.books_from
                        && stored.audited_upto == record.audited_upto;
                    if unchanged {
                        stats.unchanged += 1;
                        continue;
                    }
                    sqlx::query(
                        "UPDATE companies SET name = ?, formal_name = ?, company_number = ?, \
                         starting_from = ?, books_from = ?, audited_upto = ? WHERE guid = ?",
                    )
                    .bind(&record.name)
                    .bind(&record.formal_name)
                    .bind(&record.company_number)
                    .bind(record.starting_from)
                    .bind(record.books_from)
                    .bind(record.audited_upto)
                    .bind(&record.guid)
                    .execute(&mut *tx)
                    .await?;
                    stats.updated += 1;
                }
                None => {
                    sqlx::query(
                        "INSERT INTO companies (guid, name, formal_name, company_number, \
                         starting_from, books_from, audited_upto, is_active) \
                         VALUES (?, ?, ?, ?, ?, ?, ?, TRUE)",
                    )
                    .bind(&record.guid)
                    .bind(&record.name)
                    .bind(&record.formal_name)
                    .bind(&record.company_number)
                    .bind(record.starting_from)
                    .bind(record.books_from)
                    .bind(record.audited_upto)
                    .execute(&mut *tx)
                    .await?;
                    stats.inserted += 1;
                }
            }
        }
        tx.commit().await?;
        info!(
            "company import done: inserted={} updated={} unchanged={} skipped={}",
            stats.inserted, stats.updated, stats.unchanged, stats.skipped
        );
        Ok(stats)
    }

    async fn list_companies(&self) -> WarehouseResult<Vec<StoredCompany>> {
        let rows = sqlx::query("SELECT * FROM companies ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(company_from_row).collect()
    }

    async fn get_company(&self, name: &str) -> WarehouseResult<Option<StoredCompany>> {
        let row = sqlx::query("SELECT * FROM companies WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(company_from_row).transpose()
    }

    async fn upsert_ledgers(&self, rows: &[LedgerRow]) -> WarehouseResult<u64> {
        let mut affected = 0;
        let mut tx = self.pool.begin().await?;
        for row in rows {
            let stored = sqlx::query(
                "SELECT alter_id FROM ledgers WHERE company_name = ? AND guid = ?",
            )
            .bind(&row.company_name)
            .bind(&row.guid)
            .fetch_optional(&mut *tx)
            .await?;
            match stored {
                Some(existing) => {
                    let stored_alter: i64 = existing.try_get(0)?;
                    if row.alter_id > stored_alter {
                        update_ledger_row(&mut tx, row).await?;
                        affected += 1;
                    }
                }
                None => {
                    insert_ledger_row(&mut tx, row).await?;
                    affected += 1;
                }
            }
        }
        tx.commit().await?;
        Ok(affected)
    }

    async fn upsert_trial_balance(&self, rows: &[TrialBalanceRow]) -> WarehouseResult<u64> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(
                "INSERT INTO trial_balance (company_name, ledger_name, parent_group, \
                 opening_balance, net_transactions, closing_balance, start_date, end_date, \
                 guid, alter_id, master_id) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                 ON DUPLICATE KEY UPDATE parent_group = ?, opening_balance = ?, \
                 net_transactions = ?, closing_balance = ?, guid = ?, \
                 alter_id = GREATEST(alter_id, ?), master_id = ?",
            )
            .bind(&row.company_name)
            .bind(&row.ledger_name)
            .bind(&row.parent_group)
            .bind(row.opening_balance)
            .bind(row.net_transactions)
            .bind(row.closing_balance)
            .bind(row.start_date)
            .bind(row.end_date)
            .bind(&row.guid)
            .bind(row.alter_id)
            .bind(&row.master_id)
            .bind(&row.parent_group)
            .bind(row.opening_balance)
            .bind(row.net_transactions)
            .bind(row.closing_balance)
            .bind(&row.guid)
            .bind(row.alter_id)
            .bind(&row.master_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(rows.len() as u64)
    }

    async fn upsert_vouchers(
        &self,
        kind: VoucherKind,
        rows: &VoucherRows,
    ) -> WarehouseResult<u64> {
        let mut tx = self.pool.begin().await?;
        let affected = upsert_voucher_rows_tx(&mut tx, kind, rows).await?;
        tx.commit().await?;
        Ok(affected)
    }

    async fn upsert_vouchers_and_advance_month(
        &self,
        kind: VoucherKind,
        rows: &VoucherRows,
        company_name: &str,
        month: &str,
    ) -> WarehouseResult<u64> {
        let mut tx = self.pool.begin().await?;
        let affected = upsert_voucher_rows_tx(&mut tx, kind, rows).await?;
        advance_month_tx(&mut tx, company_name, kind.key(), month).await?;
        tx.commit().await?;
        Ok(affected)
    }

    async fn sync_state(
        &self,
        company_name: &str,
        kind: &str,
    ) -> WarehouseResult<Option<SyncState>> {
        let row = sqlx::query(
            "SELECT last_alter_id, is_initial_done, last_synced_month, last_sync_time \
             FROM sync_state WHERE company_name = ? AND voucher_type = ?",
        )
        .bind(company_name)
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(SyncState {
            company_name: company_name.to_string(),
            voucher_type: kind.to_string(),
            last_alter_id: row.try_get(0)?,
            is_initial_done: row.try_get(1)?,
            last_synced_month: row.try_get(2)?,
            last_sync_time: row
                .try_get::<Option<NaiveDateTime>, _>(3)?
                .map(|naive| Utc.from_utc_datetime(&naive)),
        }))
    }

    async fn update_watermark(
        &self,
        company_name: &str,
        kind: &str,
        alter_id: i64,
        initial_done: bool,
    ) -> WarehouseResult<()> {
        sqlx::query(
            "INSERT INTO sync_state (company_name, voucher_type, last_alter_id, \
             is_initial_done, last_sync_time) VALUES (?, ?, ?, ?, UTC_TIMESTAMP()) \
             ON DUPLICATE KEY UPDATE last_alter_id = GREATEST(last_alter_id, ?), \
             is_initial_done = is_initial_done OR ?, last_sync_time = UTC_TIMESTAMP()",
        )
        .bind(company_name)
        .bind(kind)
        .bind(alter_id)
        .bind(initial_done)
        .bind(alter_id)
        .bind(initial_done)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn advance_month(
        &self,
        company_name: &str,
        kind: &str,
        month: &str,
    ) -> WarehouseResult<()> {
        let mut tx = self.pool.begin().await?;
        advance_month_tx(&mut tx, company_name, kind, month).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn mark_initial_done(
        &self,
        company_name: &str,
        kind: &str,
        final_alter_id: i64,
        final_month: &str,
    ) -> WarehouseResult<()> {
        // One statement writes the latch, the terminal alter id and the
        // terminal month together; readers never see a half-latched row.
        sqlx::query(
            "INSERT INTO sync_state (company_name, voucher_type, last_alter_id, \
             is_initial_done, last_synced_month, last_sync_time) \
             VALUES (?, ?, ?, TRUE, ?, UTC_TIMESTAMP()) \
             ON DUPLICATE KEY UPDATE last_alter_id = GREATEST(last_alter_id, ?), \
             is_initial_done = TRUE, last_synced_month = ?, last_sync_time = UTC_TIMESTAMP()",
        )
        .bind(company_name)
        .bind(kind)
        .bind(final_alter_id)
        .bind(final_month)
        .bind(final_alter_id)
        .bind(final_month)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

async fn insert_ledger_row(
    tx: &mut Transaction<'_, MySql>,
    row: &LedgerRow,
) -> WarehouseResult<()> {
    sqlx::query(
        "INSERT INTO ledgers (company_name, ledger_name, alias, alias_2, alias_3, \
         parent_group, contact_person, email, phone, mobile, fax, website, address_line_1, \
         address_line_2, address_line_3, pincode, state, country, opening_balance, \
         credit_limit, bill_credit_period, pan, gstin, gst_registration_type, vat_tin, \
         sales_tax_number, bank_account_holder, ifsc_code, bank_branch, swift_code, \
         bank_iban, export_import_code, msme_reg_number, is_bill_wise_on, is_deleted, \
         created_date, altered_on, guid, alter_id) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, \
         ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&row.company_name)
    .bind(&row.ledger_name)
    .bind(&row.alias)
    .bind(&row.alias_2)
    .bind(&row.alias_3)
    .bind(&row.parent_group)
    .bind(&row.contact_person)
    .bind(&row.email)
    .bind(&row.phone)
    .bind(&row.mobile)
    .bind(&row.fax)
    .bind(&row.website)
    .bind(&row.address_line_1)
    .bind(&row.address_line_2)
    .bind(&row.address_line_3)
    .bind(&row.pincode)
    .bind(&row.state)
    .bind(&row.country)
    .bind(&row.opening_balance)
    .bind(&row.credit_limit)
    .bind(&row.bill_credit_period)
    .bind(&row.pan)
    .bind(&row.gstin)
    .bind(&row.gst_registration_type)
    .bind(&row.vat_tin)
    .bind(&row.sales_tax_number)
    .bind(&row.bank_account_holder)
    .bind(&row.ifsc_code)
    .bind(&row.bank_branch)
    .bind(&row.swift_code)
    .bind(&row.bank_iban)
    .bind(&row.export_import_code)
    .bind(&row.msme_reg_number)
    .bind(&row.is_bill_wise_on)
    .bind(yes_no(row.is_deleted))
    .bind(&row.created_date)
    .bind(&row.altered_on)
    .bind(&row.guid)
    .bind(row.alter_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn update_ledger_row(
    tx: &mut Transaction<'_, MySql>,
    row: &LedgerRow,
) -> WarehouseResult<()> {
    sqlx::query(
        "UPDATE ledgers SET ledger_name = ?, alias = ?, alias_2 = ?, alias_3 = ?, \
         parent_group = ?, contact_person = ?, email = ?, phone = ?, mobile = ?, fax = ?, \
         website = ?, address_line_1 = ?, address_line_2 = ?, address_line_3 = ?, \
         pincode = ?, state = ?, country = ?, opening_balance = ?, credit_limit = ?, \
         bill_credit_period = ?, pan = ?, gstin = ?, gst_registration_type = ?, \
         vat_tin = ?, sales_tax_number = ?, bank_account_holder = ?, ifsc_code = ?, \
         bank_branch = ?, swift_code = ?, bank_iban = ?, export_import_code = ?, \
         msme_reg_number = ?, is_bill_wise_on = ?, is_deleted = ?, created_date = ?, \
         altered_on = ?, alter_id = ? WHERE company_name = ? AND guid = ?",
    )
    .bind(&row.ledger_name)
    .bind(&row.alias)
    .bind(&row.alias_2)
    .bind(&row.alias_3)
    .bind(&row.parent_group)
    .bind(&row.contact_person)
    .bind(&row.email)
    .bind(&row.phone)
    .bind(&row.mobile)
    .bind(&row.fax)
    .bind(&row.website)
    .bind(&row.address_line_1)
    .bind(&row.address_line_2)
    .bind(&row.address_line_3)
    .bind(&row.pincode)
    .bind(&row.state)
    .bind(&row.country)
    .bind(&row.opening_balance)
    .bind(&row.credit_limit)
    .bind(&row.bill_credit_period)
    .bind(&row.pan)
    .bind(&row.gstin)
    .bind(&row.gst_registration_type)
    .bind(&row.vat_tin)
    .bind(&row.sales_tax_number)
    .bind(&row.bank_account_holder)
    .bind(&row.ifsc_code)
    .bind(&row.bank_branch)
    .bind(&row.swift_code)
    .bind(&row.bank_iban)
    .bind(&row.export_import_code)
    .bind(&row.msme_reg_number)
    .bind(&row.is_bill_wise_on)
    .bind(yes_no(row.is_deleted))
    .bind(&row.created_date)
    .bind(&row.altered_on)
    .bind(row.alter_id)
    .bind(&row.company_name)
    .bind(&row.guid)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
