//! Startup orchestration.
//!
//! Builds every subsystem from a validated config in dependency order:
//! store, keys, chain adapters, delegation, notifications, phases, internal
//! API state. Any error here is fatal.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::admin::AdminState;
use crate::chain::evm::EvmClient;
use crate::chain::tron::{TronClient, TronResourceApi};
use crate::chain::{ChainError, ChainFamily, ChainRegistry};
use crate::config::{CustodyConfig, CustodyPolicy};
use crate::engine::{EngineStats, PollLoop};
use crate::keys::{KeyDerivationService, KeyError};
use crate::monitor::WalletMonitor;
use crate::notify::{EventSink, NotificationClient, NotifyError};
use crate::pricing::{PriceCache, PriceError, PriceUpdater};
use crate::store::{MemoryStore, StoreError};
use crate::sweep::{FeeDelegation, ReclaimQueue, SweepProcessor, TronEnergyDelegation};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to load custody state: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("Failed to build chain adapter: {0}")]
    Chain(#[from] ChainError),

    #[error("Failed to build notification client: {0}")]
    Notify(#[from] NotifyError),

    #[error("Failed to build price updater: {0}")]
    Price(#[from] PriceError),
}

/// Everything the binary needs to run.
pub struct Runtime {
    pub store: Arc<MemoryStore>,
    pub poll_loop: PollLoop,
    pub admin: AdminState,
}

pub fn build(config: &CustodyConfig) -> Result<Runtime, StartupError> {
    let policy = Arc::new(CustodyPolicy::from_config(config));

    let store = Arc::new(match &config.store.snapshot_path {
        Some(path) => MemoryStore::load_from_file(Path::new(path))?,
        None => {
            tracing::warn!("No snapshot path configured, state will not survive a restart");
            MemoryStore::new(None)
        }
    });

    let keys = match &config.secrets.master_seed {
        Some(seed) => Some(Arc::new(KeyDerivationService::from_secret(seed)?)),
        None => {
            tracing::warn!(
                "Master seed not configured: running detection only, sweeps and provisioning are disabled"
            );
            None
        }
    };

    let mut chains = ChainRegistry::new();
    let mut tron: Option<Arc<TronClient>> = None;
    for (network, network_config) in &config.networks {
        match network.family() {
            ChainFamily::Tron => {
                let client = Arc::new(TronClient::new(network_config)?);
                chains.register(client.clone());
                tron = Some(client);
            }
            ChainFamily::Evm => {
                chains.register(Arc::new(EvmClient::new(*network, network_config)?));
            }
        }
        tracing::info!(
            network = %network,
            required_confirmations = network_config.required_confirmations,
            "Chain adapter ready"
        );
    }

    let delegator: Option<Arc<dyn FeeDelegation>> = match tron {
        Some(client) if config.delegation.enabled => {
            let resources: Arc<dyn TronResourceApi> = client;
            let delegation: Arc<dyn FeeDelegation> = Arc::new(TronEnergyDelegation::new(
                resources,
                keys.clone(),
                config.delegation.clone(),
            ));
            Some(delegation)
        }
        _ => None,
    };

    let mut queue = ReclaimQueue::new(store.clone(), config.delegation.clone());
    if let Some(delegator) = &delegator {
        queue = queue.with_delegator(delegator.clone());
    }
    let reclaims = Arc::new(queue);

    let sink: Arc<dyn EventSink> = Arc::new(NotificationClient::new(
        &config.ledger,
        config.secrets.internal_api_key.clone(),
    )?);

    let monitor = WalletMonitor::new(
        chains.clone(),
        store.clone(),
        store.clone(),
        sink.clone(),
        policy.clone(),
    );

    let stats = Arc::new(EngineStats::new());
    let price = Arc::new(PriceCache::new());

    let mut poll_loop = PollLoop::new(monitor, &config.engine)
        .with_stats(stats.clone())
        .with_snapshot(store.clone())
        .with_reclaim_queue(reclaims.clone());

    if config.sweep.enabled {
        let mut sweeper = SweepProcessor::new(
            chains,
            store.clone(),
            store.clone(),
            sink,
            policy.clone(),
            keys.clone(),
            &config.sweep,
        )
        .with_reclaim_queue(reclaims.clone());
        if let Some(delegator) = delegator {
            sweeper = sweeper.with_delegator(delegator);
        }
        poll_loop = poll_loop.with_sweeper(sweeper);

        tracing::info!(
            "Sweep phase enabled: this process must be the only sweep worker for its store"
        );
    }

    if config.price.enabled {
        poll_loop = poll_loop.with_price_updater(PriceUpdater::new(
            config.price.clone(),
            price.clone(),
        )?);
    }

    let admin = AdminState {
        store: store.clone(),
        policy,
        keys,
        stats,
        price,
        reclaims: Some(reclaims),
        api_key: config.secrets.internal_api_key.clone(),
    };

    Ok(Runtime {
        store,
        poll_loop,
        admin,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret::SecretString;
    use tempfile::tempdir;

    #[test]
    fn test_build_without_seed_or_networks() {
        let dir = tempdir().unwrap();
        let mut config = CustodyConfig::default();
        config.store.snapshot_path = Some(dir.path().join("state.json").display().to_string());

        let runtime = build(&config).unwrap();
        assert!(runtime.admin.keys.is_none());
        assert_eq!(runtime.admin.stats.cycles(), 0);
    }

    #[test]
    fn test_invalid_seed_is_fatal() {
        let mut config = CustodyConfig::default();
        config.store.snapshot_path = None;
        config.secrets.master_seed = Some(SecretString::new("not a mnemonic"));

        assert!(matches!(build(&config), Err(StartupError::Key(_))));
    }
}
