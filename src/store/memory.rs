//! In-memory custody store with JSON snapshot persistence.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::keys::allocator::{AtomicIndexAllocator, IndexAllocator};
use crate::keys::KeyResult;
use crate::store::types::{CustodialAddress, Deposit, DepositStatus, SweepRecord};
use crate::store::{
    DepositStore, InsertOutcome, ReclaimStore, StoreError, StoreResult, WalletRegistry,
};
use crate::sweep::reclaim::ReclaimTask;

/// Serialized form of the whole store.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    next_index: u64,
    addresses: Vec<CustodialAddress>,
    deposits: Vec<Deposit>,
    sweeps: Vec<SweepRecord>,
    reclaims: Vec<ReclaimTask>,
}

/// A thread-safe store for custody state.
#[derive(Default)]
pub struct MemoryStore {
    addresses: DashMap<Uuid, CustodialAddress>,
    deposits: DashMap<Uuid, Deposit>,
    by_tx_hash: DashMap<String, Uuid>,
    sweeps: Mutex<Vec<SweepRecord>>,
    reclaims: DashMap<Uuid, ReclaimTask>,
    allocator: AtomicIndexAllocator,
    persistence_path: Option<PathBuf>,
    save_lock: Mutex<()>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new(persistence_path: Option<PathBuf>) -> Self {
        Self {
            persistence_path,
            ..Self::default()
        }
    }

    /// Load from the snapshot file if it exists.
    pub fn load_from_file(path: &Path) -> StoreResult<Self> {
        let store = Self::new(Some(path.to_path_buf()));
        if !path.exists() {
            return Ok(store);
        }

        let reader = BufReader::new(File::open(path)?);
        let snapshot: Snapshot = serde_json::from_reader(reader)?;

        store.allocator.ensure_at_least(snapshot.next_index);
        for address in snapshot.addresses {
            store.allocator.ensure_at_least(address.derivation_index as u64 + 1);
            store.addresses.insert(address.id, address);
        }
        for deposit in snapshot.deposits {
            store.by_tx_hash.insert(deposit.tx_hash.clone(), deposit.id);
            store.deposits.insert(deposit.id, deposit);
        }
        *store.sweeps_guard() = snapshot.sweeps;
        for task in snapshot.reclaims.into_iter().filter(ReclaimTask::is_open) {
            store.reclaims.insert(task.id, task);
        }

        tracing::info!(
            addresses = store.addresses.len(),
            deposits = store.deposits.len(),
            next_index = store.allocator.peek(),
            "Loaded custody state from snapshot"
        );
        Ok(store)
    }

    /// Write the snapshot file. Written to a sibling temp file first and
    /// renamed so a crash mid-write leaves the previous snapshot intact.
    pub fn save_to_file(&self) -> StoreResult<()> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };
        let _guard = self.save_lock.lock().unwrap_or_else(|p| p.into_inner());

        let snapshot = Snapshot {
            next_index: self.allocator.peek(),
            addresses: self.addresses.iter().map(|r| r.value().clone()).collect(),
            deposits: self.deposits.iter().map(|r| r.value().clone()).collect(),
            sweeps: self.sweeps_guard().clone(),
            reclaims: self.reclaims.iter().map(|r| r.value().clone()).collect(),
        };

        let tmp = path.with_extension("tmp");
        {
            let writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(writer, &snapshot)?;
        }
        std::fs::rename(&tmp, path)?;

        tracing::debug!(deposits = snapshot.deposits.len(), "Saved custody state snapshot");
        Ok(())
    }

    /// Deposit counts per status.
    pub fn status_summary(&self) -> Vec<(DepositStatus, usize)> {
        let mut counts = std::collections::BTreeMap::new();
        for r in self.deposits.iter() {
            *counts.entry(r.value().status).or_insert(0) += 1;
        }
        counts.into_iter().collect()
    }

    fn sweeps_guard(&self) -> std::sync::MutexGuard<'_, Vec<SweepRecord>> {
        self.sweeps.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn transition(
        &self,
        id: Uuid,
        to: DepositStatus,
        apply: impl FnOnce(&mut Deposit),
    ) -> StoreResult<Deposit> {
        let mut entry = self
            .deposits
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("deposit {}", id)))?;
        let deposit = entry.value_mut();
        if !deposit.status.can_advance_to(to) {
            return Err(StoreError::InvalidTransition {
                id,
                from: deposit.status,
                to,
            });
        }
        deposit.status = to;
        apply(deposit);
        Ok(deposit.clone())
    }
}

#[async_trait]
impl DepositStore for MemoryStore {
    async fn find_by_tx_hash(&self, tx_hash: &str) -> StoreResult<Option<Deposit>> {
        let id = match self.by_tx_hash.get(tx_hash) {
            Some(r) => *r.value(),
            None => return Ok(None),
        };
        Ok(self.deposits.get(&id).map(|r| r.value().clone()))
    }

    async fn get_deposit(&self, id: Uuid) -> StoreResult<Option<Deposit>> {
        Ok(self.deposits.get(&id).map(|r| r.value().clone()))
    }

    async fn insert_deposit(&self, deposit: Deposit) -> StoreResult<InsertOutcome> {
        match self.by_tx_hash.entry(deposit.tx_hash.clone()) {
            Entry::Occupied(existing) => {
                let id = *existing.get();
                let stored = self
                    .deposits
                    .get(&id)
                    .map(|r| r.value().clone())
                    .ok_or_else(|| StoreError::NotFound(format!("deposit {}", id)))?;
                Ok(InsertOutcome::Existing(stored))
            }
            Entry::Vacant(slot) => {
                self.deposits.insert(deposit.id, deposit.clone());
                slot.insert(deposit.id);
                Ok(InsertOutcome::Inserted(deposit))
            }
        }
    }

    async fn update_confirmations(&self, id: Uuid, confirmations: u64) -> StoreResult<Deposit> {
        let mut entry = self
            .deposits
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("deposit {}", id)))?;
        let deposit = entry.value_mut();
        if deposit.status == DepositStatus::Pending && confirmations > deposit.confirmations {
            deposit.confirmations = confirmations;
        }
        Ok(deposit.clone())
    }

    async fn mark_confirmed(
        &self,
        id: Uuid,
        confirmations: u64,
        at: DateTime<Utc>,
    ) -> StoreResult<Deposit> {
        self.transition(id, DepositStatus::Confirmed, |d| {
            d.confirmations = d.confirmations.max(confirmations);
            d.confirmed_at = Some(at);
        })
    }

    async fn mark_credited(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<Deposit> {
        self.transition(id, DepositStatus::Credited, |d| d.credited_at = Some(at))
    }

    async fn credited_address_refs(&self) -> StoreResult<HashSet<Uuid>> {
        Ok(self
            .deposits
            .iter()
            .filter(|r| r.value().status == DepositStatus::Credited)
            .map(|r| r.value().address_ref)
            .collect())
    }

    async fn mark_swept(
        &self,
        address_ref: Uuid,
        sweep_tx_hash: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<Deposit>> {
        let mut swept = Vec::new();
        for mut entry in self.deposits.iter_mut() {
            let deposit = entry.value_mut();
            if deposit.address_ref == address_ref && deposit.status == DepositStatus::Credited {
                deposit.status = DepositStatus::Swept;
                deposit.swept_at = Some(at);
                deposit.sweep_tx_hash = Some(sweep_tx_hash.to_string());
                swept.push(deposit.clone());
            }
        }
        Ok(swept)
    }

    async fn record_sweep(&self, record: SweepRecord) -> StoreResult<()> {
        let mut sweeps = self.sweeps_guard();
        if sweeps
            .iter()
            .any(|r| r.network == record.network && r.tx_hash == record.tx_hash)
        {
            return Err(StoreError::Duplicate(format!("sweep {}", record.tx_hash)));
        }
        sweeps.push(record);
        Ok(())
    }

    async fn list_deposits(&self, status: Option<DepositStatus>) -> StoreResult<Vec<Deposit>> {
        let mut deposits: Vec<Deposit> = self
            .deposits
            .iter()
            .map(|r| r.value().clone())
            .filter(|d| status.map_or(true, |s| d.status == s))
            .collect();
        deposits.sort_by_key(|d| d.detected_at);
        Ok(deposits)
    }

    async fn sweep_records(&self) -> StoreResult<Vec<SweepRecord>> {
        Ok(self.sweeps_guard().clone())
    }
}

#[async_trait]
impl WalletRegistry for MemoryStore {
    async fn active_addresses(&self) -> StoreResult<Vec<CustodialAddress>> {
        let mut active: Vec<CustodialAddress> = self
            .addresses
            .iter()
            .filter(|r| r.value().active)
            .map(|r| r.value().clone())
            .collect();
        active.sort_by_key(|a| a.derivation_index);
        Ok(active)
    }

    async fn register_address(&self, address: CustodialAddress) -> StoreResult<()> {
        if self.addresses.iter().any(|r| {
            r.value().network == address.network
                && r.value().derivation_index == address.derivation_index
                && r.value().asset == address.asset
        }) {
            return Err(StoreError::Duplicate(format!(
                "{} index {}",
                address.network, address.derivation_index
            )));
        }
        self.allocator
            .ensure_at_least(address.derivation_index as u64 + 1);
        self.addresses.insert(address.id, address);
        Ok(())
    }
}

#[async_trait]
impl ReclaimStore for MemoryStore {
    async fn upsert_reclaim(&self, task: ReclaimTask) -> StoreResult<()> {
        self.reclaims.insert(task.id, task);
        Ok(())
    }

    async fn open_reclaims(&self) -> StoreResult<Vec<ReclaimTask>> {
        let mut open: Vec<ReclaimTask> = self
            .reclaims
            .iter()
            .filter(|r| r.value().is_open())
            .map(|r| r.value().clone())
            .collect();
        open.sort_by_key(|t| t.not_before);
        Ok(open)
    }

    async fn remove_reclaim(&self, id: Uuid) -> StoreResult<()> {
        self.reclaims.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl IndexAllocator for MemoryStore {
    async fn allocate_index(&self) -> KeyResult<u32> {
        self.allocator.allocate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::types::Network;
    use rust_decimal::Decimal;

    fn deposit(tx_hash: &str, address_ref: Uuid) -> Deposit {
        Deposit {
            id: Uuid::new_v4(),
            address_ref,
            tx_hash: tx_hash.to_string(),
            network: Network::Tron,
            asset: "USDT".to_string(),
            amount: Decimal::new(10050, 2),
            confirmations: 0,
            status: DepositStatus::Pending,
            detected_at: Utc::now(),
            confirmed_at: None,
            credited_at: None,
            swept_at: None,
            sweep_tx_hash: None,
        }
    }

    #[tokio::test]
    async fn test_insert_is_idempotent_by_tx_hash() {
        let store = MemoryStore::new(None);
        let first = deposit("abc123", Uuid::new_v4());
        let first_id = first.id;

        assert!(matches!(
            store.insert_deposit(first).await.unwrap(),
            InsertOutcome::Inserted(_)
        ));
        match store.insert_deposit(deposit("abc123", Uuid::new_v4())).await.unwrap() {
            InsertOutcome::Existing(d) => assert_eq!(d.id, first_id),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(store.list_deposits(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_confirmations_never_regress() {
        let store = MemoryStore::new(None);
        let d = deposit("tx1", Uuid::new_v4());
        let id = d.id;
        store.insert_deposit(d).await.unwrap();

        assert_eq!(store.update_confirmations(id, 5).await.unwrap().confirmations, 5);
        assert_eq!(store.update_confirmations(id, 3).await.unwrap().confirmations, 5);
        assert_eq!(store.update_confirmations(id, 9).await.unwrap().confirmations, 9);
    }

    #[tokio::test]
    async fn test_transitions_are_forward_only() {
        let store = MemoryStore::new(None);
        let d = deposit("tx1", Uuid::new_v4());
        let id = d.id;
        store.insert_deposit(d).await.unwrap();

        assert!(store.mark_credited(id, Utc::now()).await.is_err());
        let confirmed = store.mark_confirmed(id, 20, Utc::now()).await.unwrap();
        assert!(confirmed.confirmed_at.is_some());
        assert!(store.mark_confirmed(id, 25, Utc::now()).await.is_err());

        // Past PENDING, confirmation updates are ignored
        assert_eq!(store.update_confirmations(id, 40).await.unwrap().confirmations, 20);
        assert!(store.mark_credited(id, Utc::now()).await.is_ok());
    }

    #[tokio::test]
    async fn test_mark_swept_batches_credited_on_address() {
        let store = MemoryStore::new(None);
        let address = Uuid::new_v4();
        let mut ids = Vec::new();
        for tx in ["a", "b", "c"] {
            let d = deposit(tx, address);
            ids.push(d.id);
            store.insert_deposit(d).await.unwrap();
        }
        for id in &ids[..2] {
            store.mark_confirmed(*id, 20, Utc::now()).await.unwrap();
            store.mark_credited(*id, Utc::now()).await.unwrap();
        }

        assert_eq!(store.credited_address_refs().await.unwrap().len(), 1);
        let swept = store.mark_swept(address, "sweep789", Utc::now()).await.unwrap();
        assert_eq!(swept.len(), 2);
        assert!(swept
            .iter()
            .all(|d| d.sweep_tx_hash.as_deref() == Some("sweep789") && d.swept_at.is_some()));

        let pending = store.get_deposit(ids[2]).await.unwrap().unwrap();
        assert_eq!(pending.status, DepositStatus::Pending);
        assert!(store.credited_address_refs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = MemoryStore::new(Some(path.clone()));
        store
            .register_address(CustodialAddress {
                id: Uuid::new_v4(),
                merchant_id: "m-1".to_string(),
                network: Network::Tron,
                asset: "USDT".to_string(),
                address: "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t".to_string(),
                derivation_index: 4,
                active: true,
            })
            .await
            .unwrap();
        store.insert_deposit(deposit("tx9", Uuid::new_v4())).await.unwrap();
        store.save_to_file().unwrap();

        let loaded = MemoryStore::load_from_file(&path).unwrap();
        assert_eq!(loaded.active_addresses().await.unwrap().len(), 1);
        assert!(loaded.find_by_tx_hash("tx9").await.unwrap().is_some());
        assert_eq!(loaded.allocate_index().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let store = MemoryStore::new(None);
        let address = CustodialAddress {
            id: Uuid::new_v4(),
            merchant_id: "m-1".to_string(),
            network: Network::Tron,
            asset: "USDT".to_string(),
            address: "T".to_string(),
            derivation_index: 0,
            active: true,
        };
        store.register_address(address.clone()).await.unwrap();
        let again = CustodialAddress {
            id: Uuid::new_v4(),
            ..address
        };
        assert!(matches!(
            store.register_address(again).await,
            Err(StoreError::Duplicate(_))
        ));
    }
}
