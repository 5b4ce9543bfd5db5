//! Deterministic address and key derivation from the master seed.
//!
//! # Paths
//! - TRON: `m/44'/195'/0'/0/{index}`
//! - EVM networks: `m/44'/60'/0'/0/{index}`
//! - TRON energy delegator: `m/44'/195'/1'/0/0`
//!
//! The seed is held in zeroizing memory for the life of the service and is
//! the only secret the process keeps. Private keys are re-derived for each
//! signing operation and dropped right after.

use bip39::{Language, Mnemonic};
use coins_bip32::path::DerivationPath;
use coins_bip32::prelude::XPriv;
use k256::ecdsa::SigningKey;
use zeroize::Zeroizing;

use crate::chain::types::{ChainFamily, Network};
use crate::config::SecretString;
use crate::keys::address::{account_id, encode_address};
use crate::keys::signing::SigningMaterial;
use crate::keys::{KeyError, KeyResult};

/// First hardened index; custodial indices must stay below it.
const HARDENED_OFFSET: u32 = 0x8000_0000;

/// BIP-44 coin type for a network.
pub fn coin_type(network: Network) -> u32 {
    match network.family() {
        ChainFamily::Tron => 195,
        ChainFamily::Evm => 60,
    }
}

/// Derivation path of the custodial address at `index`.
pub fn custodial_path(network: Network, index: u32) -> String {
    format!("m/44'/{}'/0'/0/{}", coin_type(network), index)
}

/// Derivation path of the account that lends fee capacity on `network`.
pub fn resource_account_path(network: Network) -> String {
    format!("m/44'/{}'/1'/0/0", coin_type(network))
}

/// Key Derivation Service. Constructed once at startup and shared by
/// reference with every component that derives addresses or signs.
pub struct KeyDerivationService {
    seed: Zeroizing<Vec<u8>>,
}

impl KeyDerivationService {
    /// Build from a BIP-39 mnemonic (empty passphrase).
    pub fn from_mnemonic(phrase: &str) -> KeyResult<Self> {
        let normalized = phrase.split_whitespace().collect::<Vec<_>>().join(" ");
        let mnemonic = Mnemonic::parse_in(Language::English, normalized.as_str())
            .map_err(|e| KeyError::InvalidSeed(format!("invalid mnemonic: {}", e)))?;
        let seed = Zeroizing::new(mnemonic.to_seed("").to_vec());
        Ok(Self { seed })
    }

    /// Build from a raw hex seed (16 to 64 bytes).
    pub fn from_seed_hex(seed_hex: &str) -> KeyResult<Self> {
        let trimmed = seed_hex.trim();
        let raw = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let seed = Zeroizing::new(
            hex::decode(raw).map_err(|_| KeyError::InvalidSeed("seed is not valid hex".into()))?,
        );
        if !(16..=64).contains(&seed.len()) {
            return Err(KeyError::InvalidSeed(format!(
                "seed must be 16 to 64 bytes, got {}",
                seed.len()
            )));
        }
        Ok(Self { seed })
    }

    /// Accept either a mnemonic or a hex seed.
    pub fn from_secret(secret: &SecretString) -> KeyResult<Self> {
        let value = secret.expose().trim();
        if value.contains(char::is_whitespace) {
            Self::from_mnemonic(value)
        } else {
            Self::from_seed_hex(value)
        }
    }

    /// Custodial address at `index`. Pure: identical inputs give identical
    /// output.
    pub fn derive_address(&self, network: Network, index: u32) -> KeyResult<String> {
        let key = self.derive_key(&custodial_path(network, check_index(index)?))?;
        Ok(encode_address(network, &account_id(key.verifying_key())))
    }

    /// Signing material for the custodial address at `index`.
    pub fn derive_signing_material(
        &self,
        network: Network,
        index: u32,
    ) -> KeyResult<SigningMaterial> {
        let key = self.derive_key(&custodial_path(network, check_index(index)?))?;
        Ok(SigningMaterial::new(key, network))
    }

    /// Signing material for the fee-lending resource account.
    pub fn resource_account(&self, network: Network) -> KeyResult<SigningMaterial> {
        let key = self.derive_key(&resource_account_path(network))?;
        Ok(SigningMaterial::new(key, network))
    }

    fn derive_key(&self, path: &str) -> KeyResult<SigningKey> {
        let path: DerivationPath = path
            .parse()
            .map_err(|e| KeyError::Derivation(format!("invalid path {}: {:?}", path, e)))?;
        let root = XPriv::root_from_seed(&self.seed, None)
            .map_err(|e| KeyError::Derivation(format!("master key: {}", e)))?;
        let child = root
            .derive_path(&path)
            .map_err(|e| KeyError::Derivation(format!("child key: {}", e)))?;
        let key: &SigningKey = child.as_ref();
        Ok(key.clone())
    }
}

fn check_index(index: u32) -> KeyResult<u32> {
    if index >= HARDENED_OFFSET {
        return Err(KeyError::IndexOutOfRange(index as u64));
    }
    Ok(index)
}

impl std::fmt::Debug for KeyDerivationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyDerivationService")
            .field("seed", &"[REDACTED]")
            .finish()
    }
}
