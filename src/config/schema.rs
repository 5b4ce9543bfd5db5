//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the custody
//! engine. All types derive Serde traits for deserialization from config files.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::chain::types::Network;
use crate::config::secret::SecretString;

/// Root configuration for the custody engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CustodyConfig {
    /// Poll loop timing.
    pub engine: EngineConfig,

    /// Per-network provider and confirmation settings.
    pub networks: BTreeMap<Network, NetworkConfig>,

    /// Monitored assets and their thresholds.
    pub assets: Vec<AssetConfig>,

    /// Fee delegation (TRON energy) settings.
    pub delegation: DelegationConfig,

    /// Sweep pacing.
    pub sweep: SweepConfig,

    /// External ledger notification endpoint.
    pub ledger: LedgerConfig,

    /// Exchange rate refresh.
    pub price: PriceConfig,

    /// State snapshot location.
    pub store: StoreConfig,

    /// Internal HTTP surface.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Secrets. Environment variables take precedence over file values.
    pub secrets: SecretsConfig,
}

/// Poll loop timing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Target duration of one full cycle in seconds.
    pub poll_interval_secs: u64,

    /// Floor for the wait phase when a cycle overruns the interval.
    pub min_wait_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            min_wait_ms: 1_000,
        }
    }
}

/// Provider and policy settings for a single network.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// HTTP API (TRON) or JSON-RPC (EVM) endpoint.
    pub rpc_url: String,

    /// Provider API key, sent as `TRON-PRO-API-KEY` on TRON.
    pub api_key: Option<SecretString>,

    /// Block depth at which a deposit counts as confirmed.
    pub required_confirmations: u64,

    /// Consolidation destination for this network.
    pub hot_wallet: String,

    /// Provider rate limit (token refill per second).
    pub requests_per_second: f64,

    /// Provider burst capacity.
    pub burst: u32,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// How many blocks back to scan for inbound transfers (EVM).
    pub lookback_blocks: u64,

    /// How far back to list inbound transfers, in seconds (TRON).
    pub lookback_secs: u64,

    /// Upper bound on TRX burned by a single TRC-20 transfer, in sun.
    pub fee_limit_sun: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            api_key: None,
            required_confirmations: 12,
            hot_wallet: String::new(),
            requests_per_second: 5.0,
            burst: 5,
            request_timeout_secs: 10,
            lookback_blocks: 5_000,
            lookback_secs: 86_400,
            fee_limit_sun: 100_000_000,
        }
    }
}

/// A monitored asset on a given network.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AssetConfig {
    pub network: Network,

    /// Ticker used in notifications (e.g. "USDT").
    pub symbol: String,

    /// Token contract; `None` means the network's native coin.
    #[serde(default)]
    pub contract: Option<String>,

    pub decimals: u8,

    /// Transfers below this amount are ignored as dust.
    #[serde(default)]
    pub min_deposit: Decimal,

    /// On-chain balance required before an address is swept.
    #[serde(default)]
    pub min_sweep: Decimal,

    /// Native coins only: amount left behind on a sweep to pay the
    /// transfer's own fee (TRON bandwidth is not covered by delegation).
    #[serde(default)]
    pub fee_reserve: Decimal,
}

impl AssetConfig {
    pub fn is_native(&self) -> bool {
        self.contract.is_none()
    }
}

/// TRON energy delegation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DelegationConfig {
    pub enabled: bool,

    /// Estimated energy burned by one token transfer.
    pub energy_per_transfer: u64,

    /// Safety factor applied to the estimate.
    pub margin_multiplier: f64,

    /// Time allowed for a delegation to settle before the transfer.
    pub propagation_wait_ms: u64,

    /// Delay before the delegated stake is reclaimed.
    pub reclaim_delay_secs: u64,

    /// Reclaim attempts before a task is abandoned.
    pub reclaim_max_attempts: u32,

    pub reclaim_base_backoff_secs: u64,

    pub reclaim_max_backoff_secs: u64,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            energy_per_transfer: 65_000,
            margin_multiplier: 2.0,
            propagation_wait_ms: 3_000,
            reclaim_delay_secs: 60,
            reclaim_max_attempts: 8,
            reclaim_base_backoff_secs: 30,
            reclaim_max_backoff_secs: 3_600,
        }
    }
}

/// Sweep pacing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SweepConfig {
    pub enabled: bool,

    /// Maximum sweep attempts per minute across all addresses.
    pub attempts_per_minute: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            attempts_per_minute: 12.0,
        }
    }
}

/// External ledger notification endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Base URL; event kinds are appended as path segments.
    pub base_url: String,

    pub timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000/internal/webhooks/".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Exchange rate refresh.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PriceConfig {
    pub enabled: bool,

    pub url: String,

    /// JSON pointer to the rate inside the response document.
    pub pointer: String,

    /// Label for the quoted pair (e.g. "USDT/MXN").
    pub pair: String,

    pub refresh_secs: u64,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "https://api.coingecko.com/api/v3/simple/price?ids=tether&vs_currencies=mxn"
                .to_string(),
            pointer: "/tether/mxn".to_string(),
            pair: "USDT/MXN".to_string(),
            refresh_secs: 300,
        }
    }
}

/// State snapshot location.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub snapshot_path: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: Some("custody-state.json".to_string()),
        }
    }
}

/// Internal HTTP surface.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    pub enabled: bool,

    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Secrets. Never logged, never persisted.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SecretsConfig {
    /// BIP-39 mnemonic or hex seed.
    pub master_seed: Option<SecretString>,

    /// Shared secret for `x-internal-api-key`.
    pub internal_api_key: Option<SecretString>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_defaults() {
        let config = CustodyConfig::default();
        assert_eq!(config.engine.poll_interval_secs, 30);
        assert!(config.networks.is_empty());
        assert_eq!(config.delegation.margin_multiplier, 2.0);
        assert!(config.secrets.master_seed.is_none());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let raw = r#"
            [networks.tron]
            rpc_url = "https://api.trongrid.io"
            required_confirmations = 19
            hot_wallet = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"

            [[assets]]
            network = "tron"
            symbol = "USDT"
            contract = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"
            decimals = 6
            min_deposit = "1"
            min_sweep = "50"
        "#;
        let config: CustodyConfig = toml::from_str(raw).unwrap();
        let tron = &config.networks[&Network::Tron];
        assert_eq!(tron.required_confirmations, 19);
        assert_eq!(tron.burst, 5);
        assert_eq!(config.assets[0].min_sweep, Decimal::from_str("50").unwrap());
        assert!(!config.assets[0].is_native());
    }
}
