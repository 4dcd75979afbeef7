use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tally_ingest::CompanyRecord;
use tally_ingest::InventoryVoucherRow;
use tally_ingest::LedgerRow;
use tally_ingest::LedgerVoucherRow;
use tally_ingest::TrialBalanceRow;
use tally_ingest::VoucherKind;
use tally_ingest::VoucherRows;
use tokio::sync::RwLock;

use crate::CompanyImportStats;
use crate::StoredCompany;
use crate::SyncState;
use crate::Warehouse;
use crate::WarehouseResult;

trait VoucherRowLike: Clone {
    fn guid(&self) -> &str;
    fn alter_id(&self) -> i64;
    fn is_stub(&self) -> bool;
    fn change_status(&self) -> &str;
    fn mark_deleted(&mut self, status: &str, alter_id: i64);
}

impl VoucherRowLike for InventoryVoucherRow {
    fn guid(&self) -> &str {
        &self.guid
    }
    fn alter_id(&self) -> i64 {
        self.alter_id
    }
    fn is_stub(&self) -> bool {
        self.is_deletion_stub()
    }
    fn change_status(&self) -> &str {
        &self.change_status
    }
    fn mark_deleted(&mut self, status: &str, alter_id: i64) {
        self.is_deleted = true;
        self.change_status = status.to_string();
        self.alter_id = self.alter_id.max(alter_id);
    }
}

impl VoucherRowLike for LedgerVoucherRow {
    fn guid(&self) -> &str {
        &self.guid
    }
    fn alter_id(&self) -> i64 {
        self.alter_id
    }
    fn is_stub(&self) -> bool {
        self.is_deletion_stub()
    }
    fn change_status(&self) -> &str {
        &self.change_status
    }
    fn mark_deleted(&mut self, status: &str, alter_id: i64) {
        self.is_deleted = true;
        self.change_status = status.to_string();
        self.alter_id = self.alter_id.max(alter_id);
    }
}

type GuidRows<R> = HashMap<String, Vec<R>>;
type TrialBalanceKey = (
    String,
    String,
    Option<chrono::NaiveDate>,
    Option<chrono::NaiveDate>,
);

#[derive(Default)]
struct WarehouseState {
    companies: Vec<StoredCompany>,
    ledgers: HashMap<(String, String), LedgerRow>,
    trial_balance: HashMap<TrialBalanceKey, TrialBalanceRow>,
    inventory: HashMap<VoucherKind, GuidRows<InventoryVoucherRow>>,
    ledger_vouchers: HashMap<VoucherKind, GuidRows<LedgerVoucherRow>>,
    watermarks: HashMap<(String, String), SyncState>,
}

/// In-memory warehouse with the same observable upsert and watermark
/// semantics as the SQL implementation. Backs orchestrator tests.
#[derive(Default)]
pub struct InMemoryWarehouse {
    state: RwLock<WarehouseState>,
}

impl InMemoryWarehouse {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_company(&self, company: StoredCompany) {
        let mut state = self.state.write().await;
        state.companies.push(company);
    }

    pub async fn seed_sync_state(&self, sync_state: SyncState) {
        let mut state = self.state.write().await;
        state.watermarks.insert(
            (
                sync_state.company_name.clone(),
                sync_state.voucher_type.clone(),
            ),
            sync_state,
        );
    }

    /// Pre-load voucher rows, used to model pre-existing warehouse
    /// content in deletion-propagation tests.
    pub async fn seed_vouchers(&self, kind: VoucherKind, rows: VoucherRows) {
        let mut state = self.state.write().await;
        match rows {
            VoucherRows::Inventory(rows) => {
                let store = state.inventory.entry(kind).or_default();
                for row in rows {
                    store.entry(row.guid.clone()).or_default().push(row);
                }
            }
            VoucherRows::Ledger(rows) => {
                let store = state.ledger_vouchers.entry(kind).or_default();
                for row in rows {
                    store.entry(row.guid.clone()).or_default().push(row);
                }
            }
        }
    }

    pub async fn export_inventory(&self, kind: VoucherKind) -> Vec<InventoryVoucherRow> {
        let state = self.state.read().await;
        let mut rows: Vec<InventoryVoucherRow> = state
            .inventory
            .get(&kind)
            .map(|store| store.values().flatten().cloned().collect())
            .unwrap_or_default();
        rows.sort_by(|a, b| (&a.guid, &a.item_name).cmp(&(&b.guid, &b.item_name)));
        rows
    }

    pub async fn export_ledger_vouchers(&self, kind: VoucherKind) -> Vec<LedgerVoucherRow> {
        let state = self.state.read().await;
        let mut rows: Vec<LedgerVoucherRow> = state
            .ledger_vouchers
            .get(&kind)
            .map(|store| store.values().flatten().cloned().collect())
            .unwrap_or_default();
        rows.sort_by(|a, b| (&a.guid, &a.ledger_name).cmp(&(&b.guid, &b.ledger_name)));
        rows
    }

    pub async fn export_ledgers(&self) -> Vec<LedgerRow> {
        let state = self.state.read().await;
        let mut rows: Vec<LedgerRow> = state.ledgers.values().cloned().collect();
        rows.sort_by(|a, b| a.guid.cmp(&b.guid));
        rows
    }

    pub async fn export_trial_balance(&self) -> Vec<TrialBalanceRow> {
        let state = self.state.read().await;
        let mut rows: Vec<TrialBalanceRow> = state.trial_balance.values().cloned().collect();
        rows.sort_by(|a, b| a.ledger_name.cmp(&b.ledger_name));
        rows
    }
}

/// Shared guid-group upsert: insert unseen guids, replace on strictly
/// newer alter id, fan stub deletes out, ignore stale batches. Returns
/// the number of rows written or touched.
fn upsert_guid_groups<R: VoucherRowLike>(store: &mut GuidRows<R>, rows: &[R]) -> u64 {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&R>> = HashMap::new();
    for row in rows {
        if !groups.contains_key(row.guid()) {
            order.push(row.guid());
        }
        groups.entry(row.guid()).or_default().push(row);
    }

    let mut affected = 0_u64;
    for guid in order {
        let group = &groups[guid];
        let incoming_alter = group.iter().map(|row| row.alter_id()).max().unwrap_or(0);
        let stub = group.len() == 1 && group[0].is_stub();

        match store.get_mut(guid) {
            Some(existing) if stub => {
                let status = group[0].change_status().to_string();
                for row in existing.iter_mut() {
                    row.mark_deleted(&status, incoming_alter);
                }
                affected += existing.len() as u64;
            }
            Some(existing) => {
                let stored_alter = existing.iter().map(|row| row.alter_id()).max().unwrap_or(0);
                if incoming_alter > stored_alter {
                    *existing = group.iter().map(|row| (*row).clone()).collect();
                    affected += existing.len() as u64;
                }
            }
            None => {
                store.insert(
                    guid.to_string(),
                    group.iter().map(|row| (*row).clone()).collect(),
                );
                affected += group.len() as u64;
            }
        }
    }
    affected
}

impl WarehouseState {
    fn upsert_voucher_rows(&mut self, kind: VoucherKind, rows: &VoucherRows) -> u64 {
        match rows {
            VoucherRows::Inventory(rows) => {
                upsert_guid_groups(self.inventory.entry(kind).or_default(), rows)
            }
            VoucherRows::Ledger(rows) => {
                upsert_guid_groups(self.ledger_vouchers.entry(kind).or_default(), rows)
            }
        }
    }

    fn advance_month_in_place(&mut self, company_name: &str, kind: &str, month: &str) {
        let state = self
            .watermarks
            .entry((company_name.to_string(), kind.to_string()))
            .or_insert_with(|| SyncState::new(company_name, kind));
        state.last_synced_month = Some(month.to_string());
        state.last_sync_time = Some(Utc::now());
    }
}

#[async_trait]
impl Warehouse for InMemoryWarehouse {
    async fn import_companies(
        &self,
        records: Vec<CompanyRecord>,
    ) -> WarehouseResult<CompanyImportStats> {
        let mut stats = CompanyImportStats::default();
        let mut state = self.state.write().await;
        for record in records {
            if record.guid.is_empty() || record.name.trim().is_empty() {
                stats.skipped += 1;
                continue;
            }
            match state
                .companies
                .iter_mut()
                .find(|company| company.guid == record.guid)
            {
                Some(existing) => {
                    let incoming = StoredCompany {
                        tally_host: existing.tally_host.clone(),
                        tally_port: existing.tally_port,
                        is_active: existing.is_active,
                        ..StoredCompany::from_record(record)
                    };
                    if *existing == incoming {
                        stats.unchanged += 1;
                    } else {
                        *existing = incoming;
                        stats.updated += 1;
                    }
                }
                None => {
                    state.companies.push(StoredCompany::from_record(record));
                    stats.inserted += 1;
                }
            }
        }
        Ok(stats)
    }

    async fn list_companies(&self) -> WarehouseResult<Vec<StoredCompany>> {
        Ok(self.state.read().await.companies.clone())
    }

    async fn get_company(&self, name: &str) -> WarehouseResult<Option<StoredCompany>> {
        Ok(self
            .state
            .read()
            .await
            .companies
            .iter()
            .find(|company| company.name == name)
            .cloned())
    }

    async fn upsert_ledgers(&self, rows: &[LedgerRow]) -> WarehouseResult<u64> {
        let mut state = self.state.write().await;
        let mut affected = 0;
        for row in rows {
            let key = (row.company_name.clone(), row.guid.clone());
            match state.ledgers.get_mut(&key) {
                Some(existing) => {
                    if row.alter_id > existing.alter_id {
                        *existing = row.clone();
                        affected += 1;
                    }
                }
                None => {
                    state.ledgers.insert(key, row.clone());
                    affected += 1;
                }
            }
        }
        Ok(affected)
    }

    async fn upsert_trial_balance(&self, rows: &[TrialBalanceRow]) -> WarehouseResult<u64> {
        let mut state = self.state.write().await;
        for row in rows {
            let key = (
                row.company_name.clone(),
                row.ledger_name.clone(),
                row.start_date,
                row.end_date,
            );
            state.trial_balance.insert(key, row.clone());
        }
        Ok(rows.len() as u64)
    }

    async fn upsert_vouchers(
        &self,
        kind: VoucherKind,
        rows: &VoucherRows,
    ) -> WarehouseResult<u64> {
        let mut state = self.state.write().await;
        Ok(state.upsert_voucher_rows(kind, rows))
    }

    async fn upsert_vouchers_and_advance_month(
        &self,
        kind: VoucherKind,
        rows: &VoucherRows,
        company_name: &str,
        month: &str,
    ) -> WarehouseResult<u64> {
        // One lock acquisition stands in for the SQL transaction: rows
        // and the chunk watermark move together.
        let mut state = self.state.write().await;
        let affected = state.upsert_voucher_rows(kind, rows);
        state.advance_month_in_place(company_name, kind.key(), month);
        Ok(affected)
    }

    async fn sync_state(
        &self,
        company_name: &str,
        kind: &str,
    ) -> WarehouseResult<Option<SyncState>> {
        Ok(self
            .state
            .read()
            .await
            .watermarks
            .get(&(company_name.to_string(), kind.to_string()))
            .cloned())
    }

    async fn update_watermark(
        &self,
        company_name: &str,
        kind: &str,
        alter_id: i64,
        initial_done: bool,
    ) -> WarehouseResult<()> {
        let mut state = self.state.write().await;
        let entry = state
            .watermarks
            .entry((company_name.to_string(), kind.to_string()))
            .or_insert_with(|| SyncState::new(company_name, kind));
        entry.last_alter_id = entry.last_alter_id.max(alter_id);
        entry.is_initial_done = entry.is_initial_done || initial_done;
        entry.last_sync_time = Some(Utc::now());
        Ok(())
    }

    async fn advance_month(
        &self,
        company_name: &str,
        kind: &str,
        month: &str,
    ) -> WarehouseResult<()> {
        let mut state = self.state.write().await;
        state.advance_month_in_place(company_name, kind, month);
        Ok(())
    }

    async fn mark_initial_done(
        &self,
        company_name: &str,
        kind: &str,
        final_alter_id: i64,
        final_month: &str,
    ) -> WarehouseResult<()> {
        let mut state = self.state.write().await;
        let entry = state
            .watermarks
            .entry((company_name.to_string(), kind.to_string()))
            .or_insert_with(|| SyncState::new(company_name, kind));
        entry.last_alter_id = entry.last_alter_id.max(final_alter_id);
        entry.is_initial_done = true;
        entry.last_synced_month = Some(final_month.to_string());
        entry.last_sync_time = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn inventory_row(guid: &str, item: &str, alter_id: i64) -> InventoryVoucherRow {
        InventoryVoucherRow {
            company_name: "Demo Co".into(),
            guid: guid.into(),
            item_name: item.into(),
            voucher_number: format!("V-{guid}"),
            alter_id,
            amount: 100.0,
            change_status: "Create".into(),
            ..InventoryVoucherRow::default()
        }
    }

    fn stub_row(guid: &str, alter_id: i64) -> InventoryVoucherRow {
        InventoryVoucherRow {
            company_name: "Demo Co".into(),
            guid: guid.into(),
            alter_id,
            change_status: "Deleted".into(),
            is_deleted: true,
            ..InventoryVoucherRow::default()
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let warehouse = InMemoryWarehouse::new();
        let rows = VoucherRows::Inventory(vec![
            inventory_row("g1", "Widget A", 10),
            inventory_row("g1", "Widget B", 10),
        ]);

        let first = warehouse
            .upsert_vouchers(VoucherKind::Sales, &rows)
            .await
            .expect("first upsert");
        assert_eq!(first, 2);

        let second = warehouse
            .upsert_vouchers(VoucherKind::Sales, &rows)
            .await
            .expect("second upsert");
        assert_eq!(second, 0);
        assert_eq!(warehouse.export_inventory(VoucherKind::Sales).await.len(), 2);
    }

    #[tokio::test]
    async fn newer_alter_id_replaces_the_guid_group() {
        let warehouse = InMemoryWarehouse::new();
        warehouse
            .upsert_vouchers(
                VoucherKind::Sales,
                &VoucherRows::Inventory(vec![
                    inventory_row("g1", "Widget A", 10),
                    inventory_row("g1", "Widget B", 10),
                ]),
            )
            .await
            .expect("initial");

        // The modified voucher now has a single line.
        warehouse
            .upsert_vouchers(
                VoucherKind::Sales,
                &VoucherRows::Inventory(vec![inventory_row("g1", "Widget C", 11)]),
            )
            .await
            .expect("replace");

        let rows = warehouse.export_inventory(VoucherKind::Sales).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].item_name, "Widget C");
        assert_eq!(rows[0].alter_id, 11);

        // A stale batch must not regress the stored rows.
        warehouse
            .upsert_vouchers(
                VoucherKind::Sales,
                &VoucherRows::Inventory(vec![inventory_row("g1", "Widget A", 10)]),
            )
            .await
            .expect("stale");
        let rows = warehouse.export_inventory(VoucherKind::Sales).await;
        assert_eq!(rows[0].item_name, "Widget C");
    }

    #[tokio::test]
    async fn stub_row_fans_soft_delete_over_all_rows() {
        let warehouse = InMemoryWarehouse::new();
        warehouse
            .upsert_vouchers(
                VoucherKind::Sales,
                &VoucherRows::Inventory(vec![
                    inventory_row("g1", "Widget A", 10),
                    inventory_row("g1", "Widget B", 10),
                    inventory_row("g1", "Widget C", 10),
                    inventory_row("g1", "Widget D", 10),
                ]),
            )
            .await
            .expect("seed");

        let affected = warehouse
            .upsert_vouchers(
                VoucherKind::Sales,
                &VoucherRows::Inventory(vec![stub_row("g1", 12)]),
            )
            .await
            .expect("stub");
        assert_eq!(affected, 4);

        let rows = warehouse.export_inventory(VoucherKind::Sales).await;
        assert_eq!(rows.len(), 4);
        for row in &rows {
            assert!(row.is_deleted);
            assert_eq!(row.change_status, "Deleted");
            assert_eq!(row.alter_id, 12);
        }
    }

    #[tokio::test]
    async fn stub_for_unknown_guid_is_recorded() {
        let warehouse = InMemoryWarehouse::new();
        warehouse
            .upsert_vouchers(
                VoucherKind::Sales,
                &VoucherRows::Inventory(vec![stub_row("ghost", 5)]),
            )
            .await
            .expect("stub only");
        let rows = warehouse.export_inventory(VoucherKind::Sales).await;
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_deleted);
    }

    #[tokio::test]
    async fn watermark_is_monotone_and_latches() {
        let warehouse = InMemoryWarehouse::new();
        warehouse
            .update_watermark("Demo Co", "sales", 100, false)
            .await
            .expect("set");
        warehouse
            .update_watermark("Demo Co", "sales", 50, false)
            .await
            .expect("stale update");

        let state = warehouse
            .sync_state("Demo Co", "sales")
            .await
            .expect("read")
            .expect("exists");
        assert_eq!(state.last_alter_id, 100);

        warehouse
            .mark_initial_done("Demo Co", "sales", 120, "202409")
            .await
            .expect("latch");
        warehouse
            .update_watermark("Demo Co", "sales", 130, false)
            .await
            .expect("post-latch update");

        let state = warehouse
            .sync_state("Demo Co", "sales")
            .await
            .expect("read")
            .expect("exists");
        assert!(state.is_initial_done);
        assert_eq!(state.last_alter_id, 130);
        assert_eq!(state.last_synced_month.as_deref(), Some("202409"));
    }

    #[tokio::test]
    async fn company_import_diffs_fields() {
        let warehouse = InMemoryWarehouse::new();
        let record = CompanyRecord {
            guid: "co-1".into(),
            name: "Demo Co".into(),
            ..CompanyRecord::default()
        };
        let stats = warehouse
            .import_companies(vec![record.clone(), CompanyRecord::default()])
            .await
            .expect("import");
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.skipped, 1);

        let stats = warehouse
            .import_companies(vec![record.clone()])
            .await
            .expect("reimport");
        assert_eq!(stats.unchanged, 1);

        let stats = warehouse
            .import_companies(vec![CompanyRecord {
                formal_name: "Demo Company Pvt Ltd".into(),
                ..record
            }])
            .await
            .expect("update");
        assert_eq!(stats.updated, 1);
    }
}
