//! Custody state subsystem.
//!
//! The relational schema behind deposits and addresses is owned elsewhere;
//! the engine talks to it through the traits below. `memory.rs` provides a
//! DashMap-backed implementation with JSON snapshots, used by the worker
//! binary and by tests.
//!
//! # Invariants enforced by every implementation
//! - At most one deposit per `tx_hash`
//! - `confirmations` never decreases
//! - Status only moves PENDING → CONFIRMED → CREDITED → SWEPT

pub mod memory;
pub mod types;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::sweep::reclaim::ReclaimTask;
pub use memory::MemoryStore;
pub use types::{CustodialAddress, Deposit, DepositStatus, SweepDirection, SweepRecord};

/// Errors from the state store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Deposit {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: DepositStatus,
        to: DepositStatus,
    },

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Snapshot IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot format error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of an idempotent deposit insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(Deposit),
    /// A deposit with the same `tx_hash` already existed; nothing changed.
    Existing(Deposit),
}

#[async_trait]
pub trait DepositStore: Send + Sync {
    async fn find_by_tx_hash(&self, tx_hash: &str) -> StoreResult<Option<Deposit>>;

    async fn get_deposit(&self, id: Uuid) -> StoreResult<Option<Deposit>>;

    /// Insert keyed by `tx_hash`; a second insert for the same hash returns
    /// the stored record untouched.
    async fn insert_deposit(&self, deposit: Deposit) -> StoreResult<InsertOutcome>;

    /// Raise the confirmation count of a PENDING deposit. Lower values and
    /// deposits past PENDING are left as they are.
    async fn update_confirmations(&self, id: Uuid, confirmations: u64) -> StoreResult<Deposit>;

    /// PENDING → CONFIRMED, stamping `confirmed_at`.
    async fn mark_confirmed(
        &self,
        id: Uuid,
        confirmations: u64,
        at: DateTime<Utc>,
    ) -> StoreResult<Deposit>;

    /// CONFIRMED → CREDITED. Called on behalf of the external ledger only.
    async fn mark_credited(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<Deposit>;

    /// Addresses holding at least one CREDITED deposit.
    async fn credited_address_refs(&self) -> StoreResult<HashSet<Uuid>>;

    /// Move every CREDITED deposit on `address_ref` to SWEPT with the same
    /// sweep hash. Returns the updated deposits.
    async fn mark_swept(
        &self,
        address_ref: Uuid,
        sweep_tx_hash: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<Deposit>>;

    /// Append a hot-wallet inbound entry.
    async fn record_sweep(&self, record: SweepRecord) -> StoreResult<()>;

    async fn list_deposits(&self, status: Option<DepositStatus>) -> StoreResult<Vec<Deposit>>;

    async fn sweep_records(&self) -> StoreResult<Vec<SweepRecord>>;
}

/// Read side of the external wallet registry.
#[async_trait]
pub trait WalletRegistry: Send + Sync {
    async fn active_addresses(&self) -> StoreResult<Vec<CustodialAddress>>;

    async fn register_address(&self, address: CustodialAddress) -> StoreResult<()>;
}

/// Durable home for reclaim tasks so shutdown cannot drop them.
#[async_trait]
pub trait ReclaimStore: Send + Sync {
    async fn upsert_reclaim(&self, task: ReclaimTask) -> StoreResult<()>;

    /// Tasks not yet completed or abandoned.
    async fn open_reclaims(&self) -> StoreResult<Vec<ReclaimTask>>;

    /// Forget a task that reached a terminal state.
    async fn remove_reclaim(&self, id: Uuid) -> StoreResult<()>;
}
