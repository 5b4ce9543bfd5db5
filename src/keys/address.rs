//! Address encoding for supported networks.
//!
//! TRON addresses are Base58Check of `0x41 ‖ keccak256(pubkey)[12..]`.
//! EVM addresses are the same 20 bytes rendered as EIP-55 hex.

use alloy::primitives::{keccak256, Address};
use k256::ecdsa::VerifyingKey;

use crate::chain::types::{ChainFamily, ChainError, ChainResult, Network};

/// Version byte prefixed to every TRON mainnet address.
pub const TRON_ADDRESS_PREFIX: u8 = 0x41;

/// The 20-byte account identifier shared by TRON and EVM encodings.
pub fn account_id(key: &VerifyingKey) -> [u8; 20] {
    let point = key.to_encoded_point(false);
    // Drop the 0x04 uncompressed marker
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut id = [0u8; 20];
    id.copy_from_slice(&hash[12..]);
    id
}

/// Encode an account id for `network`.
pub fn encode_address(network: Network, id: &[u8; 20]) -> String {
    match network.family() {
        ChainFamily::Tron => tron_from_bytes(id),
        ChainFamily::Evm => Address::from_slice(id).to_checksum(None),
    }
}

pub fn tron_from_bytes(id: &[u8; 20]) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(TRON_ADDRESS_PREFIX);
    payload.extend_from_slice(id);
    bs58::encode(payload).with_check().into_string()
}

/// Decode a Base58Check TRON address into its 20-byte account id.
pub fn tron_to_bytes(address: &str) -> ChainResult<[u8; 20]> {
    let decoded = bs58::decode(address)
        .with_check(None)
        .into_vec()
        .map_err(|_| ChainError::InvalidAddress(address.to_string()))?;
    if decoded.len() != 21 || decoded[0] != TRON_ADDRESS_PREFIX {
        return Err(ChainError::InvalidAddress(address.to_string()));
    }
    let mut id = [0u8; 20];
    id.copy_from_slice(&decoded[1..]);
    Ok(id)
}

/// Hex form used by some node endpoints (`41…`).
pub fn tron_to_hex(address: &str) -> ChainResult<String> {
    let id = tron_to_bytes(address)?;
    Ok(format!("{:02x}{}", TRON_ADDRESS_PREFIX, hex::encode(id)))
}

pub fn parse_evm(address: &str) -> ChainResult<Address> {
    address
        .parse::<Address>()
        .map_err(|_| ChainError::InvalidAddress(address.to_string()))
}

pub fn is_valid_address(network: Network, address: &str) -> bool {
    match network.family() {
        ChainFamily::Tron => tron_to_bytes(address).is_ok(),
        ChainFamily::Evm => address.len() == 42 && parse_evm(address).is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USDT_TRC20: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";
    const USDT_TRC20_HEX: &str = "41a614f803b6fd780986a42c78ec9c7f77e6ded13c";

    #[test]
    fn test_tron_hex_round_trip() {
        assert_eq!(tron_to_hex(USDT_TRC20).unwrap(), USDT_TRC20_HEX);
        let id = tron_to_bytes(USDT_TRC20).unwrap();
        assert_eq!(tron_from_bytes(&id), USDT_TRC20);
    }

    #[test]
    fn test_tron_rejects_bad_checksum() {
        assert!(tron_to_bytes("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6u").is_err());
        assert!(!is_valid_address(Network::Tron, "0xdAC17F958D2ee523a2206206994597C13D831ec7"));
    }

    #[test]
    fn test_evm_validation() {
        assert!(is_valid_address(
            Network::Ethereum,
            "0xdAC17F958D2ee523a2206206994597C13D831ec7"
        ));
        assert!(!is_valid_address(Network::Bsc, USDT_TRC20));
        assert!(!is_valid_address(Network::Polygon, "0x1234"));
    }
}
