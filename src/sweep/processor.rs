//! Sweep Processor: consolidates ledger-credited balances into the hot
//! wallet, always deciding on the live on-chain balance.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::chain::{ChainError, ChainRegistry, Network, TokenAmount};
use crate::config::{CustodyPolicy, SweepConfig};
use crate::error::{CustodyError, CustodyResult};
use crate::keys::{KeyDerivationService, KeyError};
use crate::notify::{notify_best_effort, EventSink, LedgerEvent};
use crate::observability::metrics;
use crate::resilience::RateLimiter;
use crate::store::types::{CustodialAddress, SweepDirection, SweepRecord};
use crate::store::{DepositStore, WalletRegistry};
use crate::sweep::delegation::{DelegationGrant, FeeDelegation};
use crate::sweep::reclaim::ReclaimQueue;

/// What to do with an address given its live balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepDecision {
    Empty,
    BelowThreshold { balance: Decimal, min_sweep: Decimal },
    /// The balance would not cover the native fee reserve.
    ReserveOnly { balance: Decimal, fee_reserve: Decimal },
    Sweep { amount: Decimal },
}

/// `fee_reserve` is held back from the transferred amount; it is zero for
/// tokens, whose fees are paid in another currency.
pub fn sweep_decision(balance: Decimal, min_sweep: Decimal, fee_reserve: Decimal) -> SweepDecision {
    if balance <= Decimal::ZERO {
        SweepDecision::Empty
    } else if balance < min_sweep {
        SweepDecision::BelowThreshold { balance, min_sweep }
    } else if balance <= fee_reserve {
        SweepDecision::ReserveOnly {
            balance,
            fee_reserve,
        }
    } else {
        SweepDecision::Sweep {
            amount: balance - fee_reserve,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    Skipped(SweepDecision),
    Swept {
        tx_hash: String,
        amount: Decimal,
        deposits: usize,
    },
}

/// Counters for one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub candidates: usize,
    pub swept: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct SweepProcessor {
    chains: ChainRegistry,
    store: Arc<dyn DepositStore>,
    registry: Arc<dyn WalletRegistry>,
    sink: Arc<dyn EventSink>,
    policy: Arc<CustodyPolicy>,
    keys: Option<Arc<KeyDerivationService>>,
    delegators: HashMap<Network, Arc<dyn FeeDelegation>>,
    reclaims: Option<Arc<ReclaimQueue>>,
    pacer: RateLimiter,
}

impl SweepProcessor {
    pub fn new(
        chains: ChainRegistry,
        store: Arc<dyn DepositStore>,
        registry: Arc<dyn WalletRegistry>,
        sink: Arc<dyn EventSink>,
        policy: Arc<CustodyPolicy>,
        keys: Option<Arc<KeyDerivationService>>,
        config: &SweepConfig,
    ) -> Self {
        Self {
            chains,
            store,
            registry,
            sink,
            policy,
            keys,
            delegators: HashMap::new(),
            reclaims: None,
            pacer: RateLimiter::per_minute("sweep", config.attempts_per_minute),
        }
    }

    pub fn with_delegator(mut self, delegator: Arc<dyn FeeDelegation>) -> Self {
        self.delegators.insert(delegator.network(), delegator);
        self
    }

    pub fn with_reclaim_queue(mut self, queue: Arc<ReclaimQueue>) -> Self {
        self.reclaims = Some(queue);
        self
    }

    /// Active addresses holding at least one CREDITED deposit.
    pub async fn candidates(&self) -> CustodyResult<Vec<CustodialAddress>> {
        let credited = self.store.credited_address_refs().await?;
        if credited.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .registry
            .active_addresses()
            .await?
            .into_iter()
            .filter(|a| credited.contains(&a.id))
            .collect())
    }

    /// One sequential pass over all candidates.
    pub async fn run(&self) -> CustodyResult<SweepReport> {
        let candidates = self.candidates().await?;
        let mut report = SweepReport {
            candidates: candidates.len(),
            ..SweepReport::default()
        };

        for address in &candidates {
            match self.sweep_address(address).await {
                Ok(SweepOutcome::Swept { .. }) => report.swept += 1,
                Ok(SweepOutcome::Skipped(_)) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    metrics::record_sweep(address.network, &address.asset, "failed");
                    tracing::error!(
                        network = %address.network,
                        asset = %address.asset,
                        address = %address.address,
                        error = %e,
                        "Sweep failed, will retry next cycle"
                    );
                }
            }
        }

        if report.candidates > 0 {
            tracing::info!(
                candidates = report.candidates,
                swept = report.swept,
                skipped = report.skipped,
                failed = report.failed,
                "Sweep pass complete"
            );
        }
        Ok(report)
    }

    /// Check one address and consolidate it if its live balance clears the
    /// threshold. Any error leaves store state untouched.
    pub async fn sweep_address(&self, address: &CustodialAddress) -> CustodyResult<SweepOutcome> {
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

        let balance = adapter.balance(&address.address, asset).await?;
        let observed = balance.to_decimal().ok_or_else(|| {
            ChainError::InvalidResponse(format!("balance {} out of range", balance.raw))
        })?;

        let fee_reserve = if asset.is_native() {
            asset.fee_reserve
        } else {
            Decimal::ZERO
        };
        let decision = sweep_decision(observed, asset.min_sweep, fee_reserve);
        let amount = match decision {
            SweepDecision::Sweep { amount } => amount,
            SweepDecision::Empty | SweepDecision::ReserveOnly { .. } => {
                metrics::record_sweep(address.network, &address.asset, "skipped");
                return Ok(SweepOutcome::Skipped(decision));
            }
            SweepDecision::BelowThreshold { balance, min_sweep } => {
                tracing::info!(
                    address = %address.address,
                    asset = %address.asset,
                    balance = %balance,
                    min_sweep = %min_sweep,
                    "Balance below sweep threshold"
                );
                metrics::record_sweep(address.network, &address.asset, "skipped");
                return Ok(SweepOutcome::Skipped(decision));
            }
        };

        let hot_wallet = self
            .policy
            .hot_wallet(address.network)
            .ok_or(CustodyError::NoHotWallet(address.network))?;
        let keys = self.keys.as_deref().ok_or(KeyError::NotConfigured)?;

        self.pacer.acquire().await;

        let signer = keys.derive_signing_material(address.network, address.derivation_index)?;
        if signer.address() != address.address {
            return Err(KeyError::Derivation(format!(
                "index {} derives {}, registry holds {}",
                address.derivation_index,
                signer.address(),
                address.address
            ))
            .into());
        }

        let transfer_amount = if amount == observed {
            balance
        } else {
            TokenAmount::from_decimal(amount, asset.decimals).ok_or_else(|| {
                ChainError::InvalidResponse(format!("sweep amount {} not representable", amount))
            })?
        };

        let grant = self.delegate(address).await;
        let result = adapter
            .transfer(&signer, hot_wallet, asset, &transfer_amount)
            .await;
        drop(signer);

        if let Some(grant) = grant {
            self.schedule_reclaim(grant).await;
        }
        let tx_hash = result?;

        let now = Utc::now();
        let record = SweepRecord {
            network: address.network,
            asset: address.asset.clone(),
            tx_hash: tx_hash.clone(),
            amount,
            direction: SweepDirection::In,
            source_address: address.address.clone(),
            recorded_at: now,
        };
        // The transfer is on chain; a bookkeeping failure must not stop the
        // deposits from being marked
        if let Err(e) = self.store.record_sweep(record).await {
            tracing::error!(tx_hash = %tx_hash, error = %e, "Failed to record sweep");
        }

        let swept = self.store.mark_swept(address.id, &tx_hash, now).await?;

        metrics::record_sweep(address.network, &address.asset, "success");
        metrics::record_swept_amount(
            address.network,
            &address.asset,
            amount.to_f64().unwrap_or(0.0),
        );
        tracing::info!(
            network = %address.network,
            asset = %address.asset,
            address = %address.address,
            tx_hash = %tx_hash,
            amount = %amount,
            deposits = swept.len(),
            "Address swept"
        );

        for deposit in &swept {
            notify_best_effort(
                self.sink.as_ref(),
                LedgerEvent::swept(deposit, &tx_hash, amount),
            )
            .await;
        }

        Ok(SweepOutcome::Swept {
            tx_hash,
            amount,
            deposits: swept.len(),
        })
    }

    /// Lend fee capacity where the network supports it. A failure here does
    /// not stop the transfer: the address may still hold capacity from an
    /// earlier cycle.
    async fn delegate(&self, address: &CustodialAddress) -> Option<DelegationGrant> {
        let delegator = self.delegators.get(&address.network)?;
        match delegator.delegate(&address.address).await {
            Ok(grant) => Some(grant),
            Err(e) => {
                tracing::warn!(
                    address = %address.address,
                    error = %e,
                    "Fee delegation failed, attempting transfer anyway"
                );
                None
            }
        }
    }

    async fn schedule_reclaim(&self, grant: DelegationGrant) {
        let Some(queue) = &self.reclaims else {
            tracing::warn!(
                receiver = %grant.receiver,
                amount = grant.amount,
                "No reclaim queue, delegation left in place"
            );
            return;
        };
        if let Err(e) = queue.enqueue(grant).await {
            tracing::warn!(error = %e, "Failed to schedule reclaim");
        }
    }
}
