//! Fee delegation: lending transaction-fee capacity to a custodial address
//! for exactly one transfer.
//!
//! # Protocol
//! 1. Check the resource account can lend enough (else `InsufficientMasterCapacity`)
//! 2. Delegate `energy_per_transfer × margin_multiplier` worth of stake
//! 3. Wait `propagation_wait_ms` for the delegation to settle
//! 4. (caller) submit the transfer
//! 5. (caller) enqueue a reclaim regardless of the transfer outcome

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::tron::TronResourceApi;
use crate::chain::types::{ChainError, Network};
use crate::config::DelegationConfig;
use crate::keys::{KeyDerivationService, KeyError};

/// Sun per TRX.
const SUN_PER_TRX: f64 = 1_000_000.0;

#[derive(Debug, Error)]
pub enum DelegationError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("Delegation unavailable: {0}")]
    Unavailable(String),
}

pub type DelegationResult<T> = Result<T, DelegationError>;

/// Capacity lent to one address. Kept until it has been reclaimed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationGrant {
    pub network: Network,
    pub receiver: String,
    /// Stake backing the delegation, in the network's smallest unit.
    pub amount: u64,
    pub tx_hash: String,
    pub delegated_at: DateTime<Utc>,
}

/// Network-specific fee capacity lending.
#[async_trait]
pub trait FeeDelegation: Send + Sync {
    fn network(&self) -> Network;

    /// Lend enough capacity for one transfer from `receiver`. Returns once
    /// the delegation has had time to propagate.
    async fn delegate(&self, receiver: &str) -> DelegationResult<DelegationGrant>;

    /// Take a previous grant back.
    async fn reclaim(&self, grant: &DelegationGrant) -> DelegationResult<String>;
}

/// TRON energy delegation from the seed's resource account.
pub struct TronEnergyDelegation {
    resources: Arc<dyn TronResourceApi>,
    keys: Option<Arc<KeyDerivationService>>,
    config: DelegationConfig,
}

impl TronEnergyDelegation {
    pub fn new(
        resources: Arc<dyn TronResourceApi>,
        keys: Option<Arc<KeyDerivationService>>,
        config: DelegationConfig,
    ) -> Self {
        Self {
            resources,
            keys,
            config,
        }
    }

    /// Energy requested per transfer, margin included.
    pub fn energy_required(&self) -> u64 {
        (self.config.energy_per_transfer as f64 * self.config.margin_multiplier).ceil() as u64
    }

    fn keys(&self) -> DelegationResult<&KeyDerivationService> {
        self.keys
            .as_deref()
            .ok_or(DelegationError::Key(KeyError::NotConfigured))
    }
}

/// Stake in sun that yields `energy` at the current network ratio.
pub fn stake_for_energy(energy: u64, energy_per_trx: f64) -> DelegationResult<u64> {
    if !(energy_per_trx.is_finite() && energy_per_trx > 0.0) {
        return Err(DelegationError::Unavailable(format!(
            "invalid energy ratio {}",
            energy_per_trx
        )));
    }
    Ok((energy as f64 / energy_per_trx * SUN_PER_TRX).ceil() as u64)
}

#[async_trait]
impl FeeDelegation for TronEnergyDelegation {
    fn network(&self) -> Network {
        Network::Tron
    }

    async fn delegate(&self, receiver: &str) -> DelegationResult<DelegationGrant> {
        let master = self.keys()?.resource_account(Network::Tron)?;

        let energy = self.energy_required();
        let ratio = self.resources.energy_per_trx().await?;
        let required = stake_for_energy(energy, ratio)?;

        let available = self
            .resources
            .delegatable_energy_stake(master.address())
            .await?;
        if available < required {
            return Err(ChainError::InsufficientMasterCapacity {
                available,
                required,
            }
            .into());
        }

        let tx_hash = self
            .resources
            .delegate_energy(&master, receiver, required)
            .await?;
        drop(master);

        tracing::info!(
            receiver = %receiver,
            energy,
            stake_sun = required,
            tx_hash = %tx_hash,
            "Delegated energy"
        );

        tokio::time::sleep(Duration::from_millis(self.config.propagation_wait_ms)).await;

        Ok(DelegationGrant {
            network: Network::Tron,
            receiver: receiver.to_string(),
            amount: required,
            tx_hash,
            delegated_at: Utc::now(),
        })
    }

    async fn reclaim(&self, grant: &DelegationGrant) -> DelegationResult<String> {
        let master = self.keys()?.resource_account(Network::Tron)?;
        let tx_hash = self
            .resources
            .undelegate_energy(&master, &grant.receiver, grant.amount)
            .await?;
        Ok(tx_hash)
    }
}
