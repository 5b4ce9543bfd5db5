//! Chain-specific types and error definitions.

use alloy::primitives::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Supported networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Tron,
    Ethereum,
    Bsc,
    Polygon,
}

/// Address and signing scheme shared by a group of networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainFamily {
    Tron,
    Evm,
}

impl Network {
    pub const ALL: [Network; 4] = [
        Network::Tron,
        Network::Ethereum,
        Network::Bsc,
        Network::Polygon,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Tron => "tron",
            Network::Ethereum => "ethereum",
            Network::Bsc => "bsc",
            Network::Polygon => "polygon",
        }
    }

    pub fn family(&self) -> ChainFamily {
        match self {
            Network::Tron => ChainFamily::Tron,
            Network::Ethereum | Network::Bsc | Network::Polygon => ChainFamily::Evm,
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Network::ALL
            .into_iter()
            .find(|n| n.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown network '{}'", s))
    }
}

/// A token quantity in base units together with its scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAmount {
    pub raw: U256,
    pub decimals: u8,
}

impl TokenAmount {
    pub fn new(raw: U256, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    pub fn zero(decimals: u8) -> Self {
        Self::new(U256::ZERO, decimals)
    }

    /// Convert a human amount into base units. Returns `None` for negative
    /// values or when the amount carries more precision than the asset.
    pub fn from_decimal(amount: Decimal, decimals: u8) -> Option<Self> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return None;
        }
        let mut scaled = amount.normalize();
        if scaled.scale() > decimals as u32 {
            return None;
        }
        scaled.rescale(decimals as u32);
        let mantissa = u128::try_from(scaled.mantissa()).ok()?;
        Some(Self::new(U256::from(mantissa), decimals))
    }

    /// Human amount, or `None` if it does not fit a 96-bit decimal.
    pub fn to_decimal(&self) -> Option<Decimal> {
        let raw = i128::try_from(u128::try_from(self.raw).ok()?).ok()?;
        Decimal::try_from_i128_with_scale(raw, self.decimals as u32)
            .ok()
            .map(|d| d.normalize())
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }
}

impl std::fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_decimal() {
            Some(d) => f.write_str(&format_amount(d)),
            None => write!(f, "{}e-{}", self.raw, self.decimals),
        }
    }
}

/// Render an amount the way the ledger expects: no trailing noise beyond
/// the asset's precision, but always at least two decimal places.
pub fn format_amount(amount: Decimal) -> String {
    let mut value = amount.normalize();
    if value.scale() < 2 {
        value.rescale(2);
    }
    value.to_string()
}

/// An incoming transfer observed on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundTransfer {
    pub tx_hash: String,
    pub from: String,
    pub to: String,
    pub amount: TokenAmount,
    pub confirmations: u64,
}

/// Errors that can occur during blockchain operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// Provider refused the request due to throttling.
    #[error("Provider rate limit exceeded")]
    RateLimited,

    /// The sending address cannot pay the network fee.
    #[error("Insufficient fee balance: {0}")]
    InsufficientFee(String),

    /// The delegating account has no spare fee capacity to lend.
    #[error("Insufficient master capacity: available {available}, required {required}")]
    InsufficientMasterCapacity { available: u64, required: u64 },

    /// The node rejected the transaction.
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    /// The node answered with something we cannot interpret.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    /// The adapter cannot perform this operation for the asset.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Address could not be parsed for this network.
    #[error("Invalid address '{0}'")]
    InvalidAddress(String),
}

impl ChainError {
    /// Errors that clear up on their own and are retried next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChainError::Rpc(_) | ChainError::Timeout(_) | ChainError::RateLimited
        )
    }
}

/// Result type for blockchain operations.
pub type ChainResult<T> = Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_network_parse_and_display() {
        assert_eq!(Network::from_str("TRON").unwrap(), Network::Tron);
        assert_eq!(Network::Bsc.to_string(), "bsc");
        assert!(Network::from_str("solana").is_err());
        assert_eq!(Network::Polygon.family(), ChainFamily::Evm);
    }

    #[test]
    fn test_amount_conversions() {
        let amount = TokenAmount::from_decimal(Decimal::from_str("100.50").unwrap(), 6).unwrap();
        assert_eq!(amount.raw, U256::from(100_500_000u64));
        assert_eq!(amount.to_decimal().unwrap(), Decimal::from_str("100.5").unwrap());
        assert_eq!(amount.to_string(), "100.50");
    }

    #[test]
    fn test_amount_rejects_excess_precision() {
        assert!(TokenAmount::from_decimal(Decimal::from_str("0.0000001").unwrap(), 6).is_none());
        assert!(TokenAmount::from_decimal(Decimal::from_str("-1").unwrap(), 6).is_none());
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(Decimal::from_str("7").unwrap()), "7.00");
        assert_eq!(format_amount(Decimal::from_str("0.000001").unwrap()), "0.000001");
        assert_eq!(format_amount(Decimal::from_str("12.340000").unwrap()), "12.34");
    }

    #[test]
    fn test_error_display() {
        let err = ChainError::Timeout(10);
        assert_eq!(err.to_string(), "RPC timeout after 10 seconds");
        assert!(err.is_transient());

        let err = ChainError::InsufficientMasterCapacity {
            available: 10,
            required: 600,
        };
        assert!(err.to_string().contains("600"));
        assert!(!err.is_transient());
    }
}
