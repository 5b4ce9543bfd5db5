//! Ephemeral signing material.
//!
//! A `SigningMaterial` lives for exactly one signing operation. It is not
//! `Clone`, never serializes, prints as `[REDACTED]`, and the inner key is
//! zeroized when dropped.

use alloy::signers::local::PrivateKeySigner;
use k256::ecdsa::SigningKey;

use crate::chain::types::Network;
use crate::keys::address::{account_id, encode_address};
use crate::keys::KeyError;

pub struct SigningMaterial {
    key: SigningKey,
    network: Network,
    address: String,
}

impl SigningMaterial {
    pub(crate) fn new(key: SigningKey, network: Network) -> Self {
        let address = encode_address(network, &account_id(key.verifying_key()));
        Self {
            key,
            network,
            address,
        }
    }

    /// Address controlled by this key.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Sign a 32-byte digest, returning `r ‖ s ‖ v` with `v` in {27, 28}.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<[u8; 65], KeyError> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest)
            .map_err(|e| KeyError::Signing(e.to_string()))?;

        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = recovery_id.to_byte() + 27;
        Ok(out)
    }

    /// An alloy signer for EVM transaction submission. The returned signer
    /// must be dropped together with this material.
    pub fn evm_signer(&self) -> PrivateKeySigner {
        PrivateKeySigner::from_signing_key(self.key.clone())
    }
}

impl std::fmt::Debug for SigningMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningMaterial")
            .field("network", &self.network)
            .field("address", &self.address)
            .field("key", &"[REDACTED]")
            .finish()
    }
}
