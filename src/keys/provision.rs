//! Minting new custodial addresses.

use uuid::Uuid;

use crate::chain::types::Network;
use crate::error::{CustodyError, CustodyResult};
use crate::keys::allocator::IndexAllocator;
use crate::keys::derivation::KeyDerivationService;
use crate::store::types::CustodialAddress;
use crate::store::WalletRegistry;

/// Allocate a fresh derivation index, derive its address and register it.
///
/// The index is consumed even if registration fails; gaps in the index
/// sequence are harmless, reuse is not.
pub async fn provision_address(
    keys: &KeyDerivationService,
    allocator: &dyn IndexAllocator,
    registry: &dyn WalletRegistry,
    merchant_id: &str,
    network: Network,
    asset: &str,
) -> CustodyResult<CustodialAddress> {
    if merchant_id.trim().is_empty() {
        return Err(CustodyError::InvalidRequest("merchant id is empty".into()));
    }

    let index = allocator.allocate_index().await?;
    let address = keys.derive_address(network, index)?;

    let record = CustodialAddress {
        id: Uuid::new_v4(),
        merchant_id: merchant_id.to_string(),
        network,
        asset: asset.to_ascii_uppercase(),
        address,
        derivation_index: index,
        active: true,
    };
    registry.register_address(record.clone()).await?;

    tracing::info!(
        merchant_id = %record.merchant_id,
        network = %network,
        asset = %record.asset,
        address = %record.address,
        derivation_index = index,
        "Provisioned custodial address"
    );
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const TEST_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[tokio::test]
    async fn test_provision_issues_distinct_addresses() {
        let keys = KeyDerivationService::from_mnemonic(TEST_MNEMONIC).unwrap();
        let store = MemoryStore::new(None);

        let first = provision_address(&keys, &store, &store, "m-1", Network::Tron, "usdt")
            .await
            .unwrap();
        let second = provision_address(&keys, &store, &store, "m-1", Network::Tron, "USDT")
            .await
            .unwrap();

        assert_eq!(first.derivation_index, 0);
        assert_eq!(second.derivation_index, 1);
        assert_eq!(first.asset, "USDT");
        assert_ne!(first.address, second.address);
        assert_eq!(first.address, keys.derive_address(Network::Tron, 0).unwrap());
        assert_eq!(store.active_addresses().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_provision_rejects_empty_merchant() {
        let keys = KeyDerivationService::from_mnemonic(TEST_MNEMONIC).unwrap();
        let store = MemoryStore::new(None);
        let err = provision_address(&keys, &store, &store, " ", Network::Bsc, "USDT")
            .await
            .unwrap_err();
        assert!(matches!(err, CustodyError::InvalidRequest(_)));
    }
}
