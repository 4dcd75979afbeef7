//! Process-global runtime registry.
//!
//! Persisted scheduler jobs may only carry serializable primitives, so a
//! job references its live collaborators (client, warehouse, sink)
//! through a small integer key resolved here at fire time. Keys are
//! registered at process start and removed on shutdown; a job whose key
//! no longer resolves is orphaned and skipped.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::RwLock;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use tally_warehouse::Warehouse;

use crate::SyncConfig;
use crate::SyncEngine;
use crate::progress::ProgressSink;
use crate::upstream::Upstream;

/// Everything a scheduled run needs, bundled once per process.
pub struct SyncRuntime {
    pub upstream: Arc<dyn Upstream>,
    pub warehouse: Arc<dyn Warehouse>,
    pub sink: Arc<dyn ProgressSink>,
    pub config: SyncConfig,
}

impl SyncRuntime {
    #[must_use]
    pub fn engine(&self) -> SyncEngine {
        SyncEngine::with_sink(
            Arc::clone(&self.upstream),
            Arc::clone(&self.warehouse),
            self.config.clone(),
            Arc::clone(&self.sink),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuntimeKey(u64);

static NEXT_KEY: AtomicU64 = AtomicU64::new(0);
static REGISTRY: LazyLock<RwLock<HashMap<u64, Arc<SyncRuntime>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

#[must_use]
pub fn register_runtime(runtime: Arc<SyncRuntime>) -> RuntimeKey {
    let key = NEXT_KEY.fetch_add(1, Ordering::Relaxed);
    if let Ok(mut registry) = REGISTRY.write() {
        registry.insert(key, runtime);
    }
    RuntimeKey(key)
}

#[must_use]
pub fn runtime(key: RuntimeKey) -> Option<Arc<SyncRuntime>> {
    REGISTRY
        .read()
        .ok()
        .and_then(|registry| registry.get(&key.0).cloned())
}

pub fn unregister_runtime(key: RuntimeKey) {
    if let Ok(mut registry) = REGISTRY.write() {
        registry.remove(&key.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullSink;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use tally_ingest::VoucherKind;
    use tally_upstream::UpstreamResult;
    use tally_warehouse::InMemoryWarehouse;

    struct NoopUpstream;

    #[async_trait]
    impl Upstream for NoopUpstream {
        async fn probe(&self) -> UpstreamResult<()> {
            Ok(())
        }
        async fn fetch_ledgers(&self, _company_name: &str) -> UpstreamResult<String> {
            Ok(String::new())
        }
        async fn fetch_trial_balance(
            &self,
            _company_name: &str,
            _from_date: NaiveDate,
            _to_date: NaiveDate,
        ) -> UpstreamResult<String> {
            Ok(String::new())
        }
        async fn fetch_snapshot(
            &self,
            _kind: VoucherKind,
            _company_name: &str,
            _from_date: NaiveDate,
            _to_date: NaiveDate,
        ) -> UpstreamResult<String> {
            Ok(String::new())
        }
        async fn fetch_cdc(
            &self,
            _kind: VoucherKind,
            _company_name: &str,
            _last_alter_id: i64,
        ) -> UpstreamResult<String> {
            Ok(String::new())
        }
    }

    fn runtime_fixture() -> Arc<SyncRuntime> {
        Arc::new(SyncRuntime {
            upstream: Arc::new(NoopUpstream),
            warehouse: Arc::new(InMemoryWarehouse::new()),
            sink: Arc::new(NullSink),
            config: SyncConfig::default(),
        })
    }

    #[test]
    fn keys_resolve_until_unregistered() {
        let key = register_runtime(runtime_fixture());
        assert!(runtime(key).is_some());
        unregister_runtime(key);
        assert!(runtime(key).is_none());
    }

    #[test]
    fn keys_are_unique_per_registration() {
        let first = register_runtime(runtime_fixture());
        let second = register_runtime(runtime_fixture());
        assert_ne!(first, second);
        unregister_runtime(first);
        assert!(runtime(second).is_some());
        unregister_runtime(second);
    }
}
