//! Wallet Monitor: reconciles on-chain inbound transfers with stored
//! deposits and reports state changes to the ledger.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::chain::{ChainRegistry, InboundTransfer};
use crate::config::{AssetConfig, CustodyPolicy};
use crate::error::{CustodyError, CustodyResult};
use crate::monitor::state::{reconcile, Observation, ReconcileAction, SkipReason};
use crate::notify::{notify_best_effort, EventSink, LedgerEvent};
use crate::observability::metrics;
use crate::store::types::{CustodialAddress, Deposit, DepositStatus};
use crate::store::{DepositStore, InsertOutcome, WalletRegistry};

/// Counters for one detection pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub addresses: usize,
    pub detected: usize,
    pub confirmed: usize,
    pub dust: usize,
    pub errors: usize,
}

pub struct WalletMonitor {
    chains: ChainRegistry,
    store: Arc<dyn DepositStore>,
    registry: Arc<dyn WalletRegistry>,
    sink: Arc<dyn EventSink>,
    policy: Arc<CustodyPolicy>,
}

impl WalletMonitor {
    pub fn new(
        chains: ChainRegistry,
        store: Arc<dyn DepositStore>,
        registry: Arc<dyn WalletRegistry>,
        sink: Arc<dyn EventSink>,
        policy: Arc<CustodyPolicy>,
    ) -> Self {
        Self {
            chains,
            store,
            registry,
            sink,
            policy,
        }
    }

    /// Scan every active address once, sequentially. An error on one
    /// address is logged and the scan moves on.
    pub async fn scan(&self) -> CustodyResult<ScanReport> {
        let addresses = self.registry.active_addresses().await?;
        let mut report = ScanReport {
            addresses: addresses.len(),
            ..ScanReport::default()
        };

        for address in &addresses {
            if let Err(e) = self.scan_address(address, &mut report).await {
                report.errors += 1;
                tracing::warn!(
                    network = %address.network,
                    asset = %address.asset,
                    address = %address.address,
                    error = %e,
                    "Address scan failed"
                );
            }
        }

        tracing::debug!(
            addresses = report.addresses,
            detected = report.detected,
            confirmed = report.confirmed,
            errors = report.errors,
            "Detection pass complete"
        );
        Ok(report)
    }

    async fn scan_address(
        &self,
        address: &CustodialAddress,
        report: &mut ScanReport,
    ) -> CustodyResult<()> {
        let adapter = self
            .chains
            .get(address.network)
            .ok_or(CustodyError::NoAdapter(address.network))?;
        let asset = self
            .policy
            .asset(address.network, &address.asset)
            .ok_or_else(|| CustodyError::UnknownAsset {
                network: address.network,
                asset: address.asset.clone(),
            })?;

        let transfers = adapter.incoming_transfers(&address.address, asset).await?;
        for transfer in &transfers {
            self.reconcile_transfer(address, asset, transfer, report)
                .await?;
        }
        Ok(())
    }

    async fn reconcile_transfer(
        &self,
        address: &CustodialAddress,
        asset: &AssetConfig,
        transfer: &InboundTransfer,
        report: &mut ScanReport,
    ) -> CustodyResult<()> {
        let Some(amount) = transfer.amount.to_decimal() else {
            tracing::warn!(
                tx_hash = %transfer.tx_hash,
                raw = %transfer.amount.raw,
                "Transfer amount out of range, ignored"
            );
            return Ok(());
        };

        let existing = self.store.find_by_tx_hash(&transfer.tx_hash).await?;
        if let Some(deposit) = &existing {
            if deposit.address_ref != address.id {
                tracing::warn!(
                    tx_hash = %transfer.tx_hash,
                    deposit_id = %deposit.id,
                    "Transaction already recorded for another address"
                );
                return Ok(());
            }
        }

        let required = self.policy.required_confirmations(address.network);
        let action = reconcile(
            existing.as_ref(),
            Observation {
                amount,
                confirmations: transfer.confirmations,
            },
            asset.min_deposit,
            required,
        );

        match (action, existing.as_ref()) {
            (ReconcileAction::Skip(SkipReason::Dust), _) => {
                report.dust += 1;
                tracing::debug!(
                    tx_hash = %transfer.tx_hash,
                    amount = %amount,
                    min_deposit = %asset.min_deposit,
                    "Transfer below minimum deposit, ignored"
                );
            }
            (ReconcileAction::Skip(SkipReason::Regression), Some(deposit)) => {
                tracing::debug!(
                    deposit_id = %deposit.id,
                    stored = deposit.confirmations,
                    observed = transfer.confirmations,
                    "Provider reported fewer confirmations than stored"
                );
            }
            (ReconcileAction::Create { status }, _) => {
                self.create_deposit(address, asset, transfer, amount, status, report)
                    .await?;
            }
            (ReconcileAction::RaiseConfirmations { confirmations }, Some(deposit)) => {
                self.store
                    .update_confirmations(deposit.id, confirmations)
                    .await?;
                tracing::debug!(
                    deposit_id = %deposit.id,
                    confirmations,
                    required,
                    "Confirmations updated"
                );
            }
            (ReconcileAction::Confirm { confirmations }, Some(deposit)) => {
                let deposit = self
                    .store
                    .mark_confirmed(deposit.id, confirmations, Utc::now())
                    .await?;
                self.on_confirmed(&deposit, report).await;
            }
            _ => {}
        }
        Ok(())
    }

    async fn create_deposit(
        &self,
        address: &CustodialAddress,
        asset: &AssetConfig,
        transfer: &InboundTransfer,
        amount: Decimal,
        status: DepositStatus,
        report: &mut ScanReport,
    ) -> CustodyResult<()> {
        let now = Utc::now();
        let deposit = Deposit {
            id: Uuid::new_v4(),
            address_ref: address.id,
            tx_hash: transfer.tx_hash.clone(),
            network: address.network,
            asset: asset.symbol.to_uppercase(),
            amount,
            confirmations: transfer.confirmations,
            status,
            detected_at: now,
            confirmed_at: (status == DepositStatus::Confirmed).then_some(now),
            credited_at: None,
            swept_at: None,
            sweep_tx_hash: None,
        };

        let deposit = match self.store.insert_deposit(deposit).await? {
            InsertOutcome::Inserted(deposit) => deposit,
            // Lost a race with another observation of the same hash
            InsertOutcome::Existing(_) => return Ok(()),
        };

        report.detected += 1;
        metrics::record_deposit_detected(deposit.network, &deposit.asset);
        tracing::info!(
            deposit_id = %deposit.id,
            network = %deposit.network,
            asset = %deposit.asset,
            address = %address.address,
            tx_hash = %deposit.tx_hash,
            amount = %deposit.amount,
            confirmations = deposit.confirmations,
            status = %deposit.status,
            "Deposit detected"
        );
        notify_best_effort(self.sink.as_ref(), LedgerEvent::detected(address, &deposit)).await;

        if deposit.status == DepositStatus::Confirmed {
            self.on_confirmed(&deposit, report).await;
        }
        Ok(())
    }

    async fn on_confirmed(&self, deposit: &Deposit, report: &mut ScanReport) {
        report.confirmed += 1;
        metrics::record_deposit_confirmed(deposit.network, &deposit.asset);
        tracing::info!(
            deposit_id = %deposit.id,
            tx_hash = %deposit.tx_hash,
            confirmations = deposit.confirmations,
            "Deposit confirmed"
        );
        notify_best_effort(self.sink.as_ref(), LedgerEvent::confirmed(deposit)).await;
    }
}
