//! Configuration validation.
//!
//! Serde handles syntax; this module checks semantics. Validation is a pure
//! function that reports every problem at once rather than the first.

use std::collections::HashSet;

use rust_decimal::Decimal;

use crate::chain::types::ChainFamily;
use crate::config::schema::CustodyConfig;
use crate::keys::address::is_valid_address;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &CustodyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.engine.poll_interval_secs == 0 {
        errors.push(ValidationError::new("engine.poll_interval_secs", "must be greater than zero"));
    }

    for (network, net) in &config.networks {
        let field = |name: &str| format!("networks.{}.{}", network, name);

        if url::Url::parse(&net.rpc_url).is_err() {
            errors.push(ValidationError::new(field("rpc_url"), "must be an absolute URL"));
        }
        if !(net.requests_per_second > 0.0) {
            errors.push(ValidationError::new(field("requests_per_second"), "must be positive"));
        }
        if net.burst == 0 {
            errors.push(ValidationError::new(field("burst"), "must be at least 1"));
        }
        if net.request_timeout_secs == 0 {
            errors.push(ValidationError::new(field("request_timeout_secs"), "must be greater than zero"));
        }
        if !is_valid_address(*network, &net.hot_wallet) {
            errors.push(ValidationError::new(
                field("hot_wallet"),
                format!("'{}' is not a valid {} address", net.hot_wallet, network),
            ));
        }
    }

    let mut seen = HashSet::new();
    for (i, asset) in config.assets.iter().enumerate() {
        let field = |name: &str| format!("assets[{}].{}", i, name);

        if !config.networks.contains_key(&asset.network) {
            errors.push(ValidationError::new(
                field("network"),
                format!("network '{}' has no [networks.{}] section", asset.network, asset.network),
            ));
        }
        if !seen.insert((asset.network, asset.symbol.to_uppercase())) {
            errors.push(ValidationError::new(
                field("symbol"),
                format!("duplicate asset {} on {}", asset.symbol, asset.network),
            ));
        }
        if asset.decimals > 28 {
            errors.push(ValidationError::new(field("decimals"), "must be at most 28"));
        }
        if asset.min_deposit < Decimal::ZERO {
            errors.push(ValidationError::new(field("min_deposit"), "must not be negative"));
        }
        if asset.min_sweep < Decimal::ZERO {
            errors.push(ValidationError::new(field("min_sweep"), "must not be negative"));
        }
        if asset.fee_reserve < Decimal::ZERO {
            errors.push(ValidationError::new(field("fee_reserve"), "must not be negative"));
        } else if !asset.fee_reserve.is_zero() && !asset.is_native() {
            errors.push(ValidationError::new(
                field("fee_reserve"),
                "only applies to native coins",
            ));
        }
        match (&asset.contract, asset.network.family()) {
            (None, ChainFamily::Evm) => errors.push(ValidationError::new(
                field("contract"),
                "native coins cannot be monitored on EVM networks",
            )),
            (Some(contract), _) if !is_valid_address(asset.network, contract) => {
                errors.push(ValidationError::new(
                    field("contract"),
                    format!("'{}' is not a valid {} address", contract, asset.network),
                ))
            }
            _ => {}
        }
    }

    if config.delegation.margin_multiplier < 1.0 {
        errors.push(ValidationError::new("delegation.margin_multiplier", "must be at least 1.0"));
    }
    if !(config.sweep.attempts_per_minute > 0.0) {
        errors.push(ValidationError::new("sweep.attempts_per_minute", "must be positive"));
    }
    if url::Url::parse(&config.ledger.base_url).is_err() {
        errors.push(ValidationError::new("ledger.base_url", "must be an absolute URL"));
    }
    if config.price.enabled && url::Url::parse(&config.price.url).is_err() {
        errors.push(ValidationError::new("price.url", "must be an absolute URL"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::types::Network;
    use crate::config::schema::{AssetConfig, NetworkConfig};
    use std::str::FromStr;

    const USDT_TRC20: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

    fn tron_config() -> CustodyConfig {
        let mut config = CustodyConfig::default();
        config.networks.insert(
            Network::Tron,
            NetworkConfig {
                rpc_url: "https://api.trongrid.io".to_string(),
                hot_wallet: USDT_TRC20.to_string(),
                required_confirmations: 19,
                ..NetworkConfig::default()
            },
        );
        config.assets.push(AssetConfig {
            network: Network::Tron,
            symbol: "USDT".to_string(),
            contract: Some(USDT_TRC20.to_string()),
            decimals: 6,
            min_deposit: Decimal::from_str("1").unwrap(),
            min_sweep: Decimal::from_str("50").unwrap(),
            fee_reserve: Decimal::ZERO,
        });
        config
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&tron_config()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = tron_config();
        config.engine.poll_interval_secs = 0;
        config.assets[0].min_sweep = Decimal::from_str("-1").unwrap();
        config.assets.push(config.assets[0].clone());

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"engine.poll_interval_secs"));
        assert!(fields.contains(&"assets[0].min_sweep"));
        assert!(fields.contains(&"assets[1].symbol"));
    }

    #[test]
    fn test_asset_without_network_section() {
        let mut config = tron_config();
        config.assets.push(AssetConfig {
            network: Network::Ethereum,
            symbol: "USDC".to_string(),
            contract: Some("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".to_string()),
            decimals: 6,
            min_deposit: Decimal::ONE,
            min_sweep: Decimal::ONE,
            fee_reserve: Decimal::ZERO,
        });
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "assets[1].network");
    }

    #[test]
    fn test_fee_reserve_only_on_native_coins() {
        let mut config = tron_config();
        config.assets[0].fee_reserve = Decimal::ONE;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "assets[0].fee_reserve");

        config.assets[0].contract = None;
        config.assets[0].symbol = "TRX".to_string();
        assert!(validate_config(&config).is_ok());

        config.assets[0].fee_reserve = Decimal::NEGATIVE_ONE;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "assets[0].fee_reserve");
    }

    #[test]
    fn test_bad_hot_wallet() {
        let mut config = tron_config();
        config.networks.get_mut(&Network::Tron).unwrap().hot_wallet = "0x1234".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "networks.tron.hot_wallet");
    }
}
