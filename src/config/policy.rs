//! Lookup tables derived from configuration.

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::chain::types::Network;
use crate::config::schema::{AssetConfig, CustodyConfig};

/// Thresholds and destinations the monitor and sweeper consult.
///
/// Required confirmations are per network, never per asset.
#[derive(Debug, Clone, Default)]
pub struct CustodyPolicy {
    assets: HashMap<(Network, String), AssetConfig>,
    confirmations: HashMap<Network, u64>,
    hot_wallets: HashMap<Network, String>,
}

impl CustodyPolicy {
    pub fn from_config(config: &CustodyConfig) -> Self {
        let mut policy = Self::default();
        for (network, net) in &config.networks {
            policy = policy
                .with_confirmations(*network, net.required_confirmations)
                .with_hot_wallet(*network, net.hot_wallet.clone());
        }
        for asset in &config.assets {
            policy = policy.with_asset(asset.clone());
        }
        policy
    }

    pub fn with_asset(mut self, asset: AssetConfig) -> Self {
        self.assets
            .insert((asset.network, asset.symbol.to_uppercase()), asset);
        self
    }

    pub fn with_confirmations(mut self, network: Network, required: u64) -> Self {
        self.confirmations.insert(network, required);
        self
    }

    pub fn with_hot_wallet(mut self, network: Network, address: impl Into<String>) -> Self {
        self.hot_wallets.insert(network, address.into());
        self
    }

    pub fn asset(&self, network: Network, symbol: &str) -> Option<&AssetConfig> {
        self.assets.get(&(network, symbol.to_uppercase()))
    }

    /// Required block depth; networks missing from the table are never
    /// considered confirmed.
    pub fn required_confirmations(&self, network: Network) -> u64 {
        self.confirmations.get(&network).copied().unwrap_or(u64::MAX)
    }

    pub fn hot_wallet(&self, network: Network) -> Option<&str> {
        self.hot_wallets
            .get(&network)
            .map(String::as_str)
            .filter(|a| !a.is_empty())
    }

    pub fn min_deposit(&self, network: Network, symbol: &str) -> Option<Decimal> {
        self.asset(network, symbol).map(|a| a.min_deposit)
    }

    pub fn min_sweep(&self, network: Network, symbol: &str) -> Option<Decimal> {
        self.asset(network, symbol).map(|a| a.min_sweep)
    }
}
