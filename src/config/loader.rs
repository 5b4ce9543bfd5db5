//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::chain::types::Network;
use crate::config::schema::CustodyConfig;
use crate::config::secret::SecretString;
use crate::config::validation::{validate_config, ValidationError};

pub const MASTER_SEED_ENV_VAR: &str = "CUSTODY_MASTER_SEED";
pub const INTERNAL_API_KEY_ENV_VAR: &str = "CUSTODY_INTERNAL_API_KEY";
pub const LEDGER_URL_ENV_VAR: &str = "CUSTODY_LEDGER_URL";
pub const POLL_INTERVAL_ENV_VAR: &str = "CUSTODY_POLL_INTERVAL_SECS";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {reason}")]
    Env { var: String, reason: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, override from the process environment, and validate.
///
/// A missing file is not an error: defaults plus environment are used.
pub fn load_config(path: &Path) -> Result<CustodyConfig, ConfigError> {
    let mut config = if path.exists() {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)?
    } else {
        tracing::warn!(path = %path.display(), "Config file not found, using defaults");
        CustodyConfig::default()
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Parse and validate a TOML document without touching the environment.
pub fn load_from_str(content: &str) -> Result<CustodyConfig, ConfigError> {
    let config: CustodyConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply environment overrides through `lookup`.
///
/// Secrets found in the environment replace file values. Per-network
/// endpoints use `CUSTODY_<NETWORK>_RPC_URL` and `CUSTODY_<NETWORK>_API_KEY`.
pub fn apply_env_overrides<F>(config: &mut CustodyConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(seed) = lookup(MASTER_SEED_ENV_VAR).filter(|v| !v.trim().is_empty()) {
        config.secrets.master_seed = Some(SecretString::new(seed));
    }
    if let Some(key) = lookup(INTERNAL_API_KEY_ENV_VAR).filter(|v| !v.trim().is_empty()) {
        config.secrets.internal_api_key = Some(SecretString::new(key));
    }
    if let Some(url) = lookup(LEDGER_URL_ENV_VAR) {
        config.ledger.base_url = url;
    }
    if let Some(raw) = lookup(POLL_INTERVAL_ENV_VAR) {
        config.engine.poll_interval_secs = raw.parse().map_err(|e| ConfigError::Env {
            var: POLL_INTERVAL_ENV_VAR.to_string(),
            reason: format!("{}", e),
        })?;
    }

    for network in Network::ALL {
        let prefix = format!("CUSTODY_{}", network.as_str().to_uppercase());
        let rpc = lookup(&format!("{}_RPC_URL", prefix));
        let key = lookup(&format!("{}_API_KEY", prefix));
        if rpc.is_none() && key.is_none() {
            continue;
        }
        let entry = config.networks.entry(network).or_default();
        if let Some(url) = rpc {
            entry.rpc_url = url;
        }
        if let Some(key) = key {
            entry.api_key = Some(SecretString::new(key));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides_secrets_and_endpoints() {
        let env: HashMap<&str, &str> = [
            (MASTER_SEED_ENV_VAR, "seed words"),
            (INTERNAL_API_KEY_ENV_VAR, "shared"),
            ("CUSTODY_TRON_RPC_URL", "https://nile.trongrid.io"),
            ("CUSTODY_TRON_API_KEY", "trongrid-key"),
        ]
        .into_iter()
        .collect();

        let mut config = CustodyConfig::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.secrets.master_seed.unwrap().expose(), "seed words");
        assert_eq!(config.secrets.internal_api_key.unwrap().expose(), "shared");
        let tron = &config.networks[&Network::Tron];
        assert_eq!(tron.rpc_url, "https://nile.trongrid.io");
        assert_eq!(tron.api_key.as_ref().unwrap().expose(), "trongrid-key");
        assert!(!config.networks.contains_key(&Network::Ethereum));
    }

    #[test]
    fn test_blank_seed_is_ignored() {
        let mut config = CustodyConfig::default();
        apply_env_overrides(&mut config, |k| {
            (k == MASTER_SEED_ENV_VAR).then(|| "  ".to_string())
        })
        .unwrap();
        assert!(config.secrets.master_seed.is_none());
    }

    #[test]
    fn test_bad_interval_rejected() {
        let mut config = CustodyConfig::default();
        let result = apply_env_overrides(&mut config, |k| {
            (k == POLL_INTERVAL_ENV_VAR).then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Env { .. })));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = load_config(Path::new("/nonexistent/custody.toml")).unwrap();
        assert!(config.assets.is_empty());
    }
}
