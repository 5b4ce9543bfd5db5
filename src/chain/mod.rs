//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! NetworkConfig (endpoint, API key, rate limit, timeout)
//!     → tron.rs (TronGrid-compatible HTTP API, local signing)
//!     → evm.rs  (JSON-RPC via alloy, ERC-20 only)
//!     → ChainAdapter (one instance per network, held in ChainRegistry)
//! ```
//!
//! # Security Constraints
//! - Signing material is borrowed for one call and never stored
//! - API keys never appear in logs or errors
//! - Every provider call waits on the network's rate limiter and has a deadline

pub mod evm;
pub mod tron;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AssetConfig;
use crate::keys::SigningMaterial;
pub use types::{ChainError, ChainFamily, ChainResult, InboundTransfer, Network, TokenAmount};

/// Read and submit operations against one network.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn network(&self) -> Network;

    /// Recent inbound transfers of `asset` to `address`, bounded by the
    /// configured lookback window. At most one entry per transaction hash.
    async fn incoming_transfers(
        &self,
        address: &str,
        asset: &AssetConfig,
    ) -> ChainResult<Vec<InboundTransfer>>;

    /// Live on-chain balance.
    async fn balance(&self, address: &str, asset: &AssetConfig) -> ChainResult<TokenAmount>;

    /// Move `amount` from the signer's address to `to`. Returns the
    /// transaction hash once the node has accepted it.
    async fn transfer(
        &self,
        signer: &SigningMaterial,
        to: &str,
        asset: &AssetConfig,
        amount: &TokenAmount,
    ) -> ChainResult<String>;
}

/// Adapters keyed by network.
#[derive(Clone, Default)]
pub struct ChainRegistry {
    adapters: HashMap<Network, Arc<dyn ChainAdapter>>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn ChainAdapter>) {
        self.adapters.insert(adapter.network(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, network: Network) -> Option<&Arc<dyn ChainAdapter>> {
        self.adapters.get(&network)
    }

    pub fn networks(&self) -> Vec<Network> {
        let mut networks: Vec<_> = self.adapters.keys().copied().collect();
        networks.sort();
        networks
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for ChainRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainRegistry")
            .field("networks", &self.networks())
            .finish()
    }
}

/// Collapse several transfer entries of the same transaction into one,
/// summing amounts and keeping the lowest confirmation count. Order of
/// first appearance is preserved.
pub fn merge_by_tx_hash(transfers: Vec<InboundTransfer>) -> Vec<InboundTransfer> {
    let mut merged: Vec<InboundTransfer> = Vec::with_capacity(transfers.len());
    for transfer in transfers {
        match merged.iter_mut().find(|t| t.tx_hash == transfer.tx_hash) {
            Some(existing) => {
                existing.amount.raw = existing.amount.raw.saturating_add(transfer.amount.raw);
                existing.confirmations = existing.confirmations.min(transfer.confirmations);
            }
            None => merged.push(transfer),
        }
    }
    merged
}
