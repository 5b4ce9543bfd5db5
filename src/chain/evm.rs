//! EVM adapter (Ethereum, BSC, Polygon) over JSON-RPC.
//!
//! Only ERC-20 assets are supported: inbound transfers are read from
//! `Transfer` logs, which plain value transfers never produce.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, TransactionRequest};
use alloy::sol;
use alloy::sol_types::{SolCall, SolEvent};
use async_trait::async_trait;
use tokio::time::timeout;
use url::Url;

use crate::chain::types::{ChainError, ChainResult, InboundTransfer, Network, TokenAmount};
use crate::chain::{merge_by_tx_hash, ChainAdapter};
use crate::config::{AssetConfig, NetworkConfig};
use crate::keys::address::parse_evm;
use crate::keys::SigningMaterial;
use crate::observability::metrics;
use crate::resilience::RateLimiter;

sol! {
    interface IERC20 {
        #[derive(Debug)]
        event Transfer(address indexed from, address indexed to, uint256 value);

        function balanceOf(address owner) external view returns (uint256);

        function transfer(address to, uint256 amount) external returns (bool);
    }
}

/// JSON-RPC client for one EVM network.
pub struct EvmClient {
    network: Network,
    rpc_url: Url,
    provider: Arc<dyn Provider + Send + Sync>,
    limiter: Arc<RateLimiter>,
    timeout_duration: Duration,
    lookback_blocks: u64,
}

impl EvmClient {
    pub fn new(network: Network, config: &NetworkConfig) -> ChainResult<Self> {
        let rpc_url: Url = config.rpc_url.parse().map_err(|e| {
            ChainError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        let provider = Arc::new(ProviderBuilder::new().connect_http(rpc_url.clone()))
            as Arc<dyn Provider + Send + Sync>;

        Ok(Self {
            network,
            rpc_url,
            provider,
            limiter: Arc::new(RateLimiter::new(
                network.as_str(),
                config.requests_per_second,
                config.burst,
            )),
            timeout_duration: Duration::from_secs(config.request_timeout_secs),
            lookback_blocks: config.lookback_blocks,
        })
    }

    /// Rate-limited, deadline-bounded provider call.
    async fn rpc<T, E, F>(&self, operation: &'static str, request: F) -> ChainResult<T>
    where
        F: IntoFuture<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.limiter.acquire().await;
        match timeout(self.timeout_duration, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                metrics::record_provider_error(self.network, operation);
                Err(classify_rpc_error(&e.to_string()))
            }
            Err(_) => {
                metrics::record_provider_error(self.network, operation);
                Err(ChainError::Timeout(self.timeout_duration.as_secs()))
            }
        }
    }

    pub async fn head_block(&self) -> ChainResult<u64> {
        self.rpc("block_number", self.provider.get_block_number())
            .await
    }

    fn contract(&self, asset: &AssetConfig) -> ChainResult<Address> {
        let contract = asset.contract.as_deref().ok_or_else(|| {
            ChainError::Unsupported(format!(
                "native {} on {} has no transfer logs",
                asset.symbol, self.network
            ))
        })?;
        parse_evm(contract)
    }
}

#[async_trait]
impl ChainAdapter for EvmClient {
    fn network(&self) -> Network {
        self.network
    }

    async fn incoming_transfers(
        &self,
        address: &str,
        asset: &AssetConfig,
    ) -> ChainResult<Vec<InboundTransfer>> {
        let contract = self.contract(asset)?;
        let to = parse_evm(address)?;

        let head = self.head_block().await?;
        let filter = Filter::new()
            .address(contract)
            .event_signature(IERC20::Transfer::SIGNATURE_HASH)
            .topic2(to.into_word())
            .from_block(head.saturating_sub(self.lookback_blocks))
            .to_block(head);

        let logs = self.rpc("get_logs", self.provider.get_logs(&filter)).await?;

        let mut transfers = Vec::with_capacity(logs.len());
        for log in logs {
            let (Some(tx_hash), Some(block)) = (log.transaction_hash, log.block_number) else {
                // Pending logs carry neither
                continue;
            };
            let decoded = match log.log_decode::<IERC20::Transfer>() {
                Ok(decoded) => decoded.inner.data,
                Err(e) => {
                    tracing::warn!(network = %self.network, tx_hash = %tx_hash, error = %e, "Undecodable Transfer log");
                    continue;
                }
            };
            transfers.push(InboundTransfer {
                tx_hash: tx_hash.to_string(),
                from: decoded.from.to_checksum(None),
                to: address.to_string(),
                amount: TokenAmount::new(decoded.value, asset.decimals),
                confirmations: head.saturating_sub(block),
            });
        }
        Ok(merge_by_tx_hash(transfers))
    }

    async fn balance(&self, address: &str, asset: &AssetConfig) -> ChainResult<TokenAmount> {
        let owner = parse_evm(address)?;

        if asset.is_native() {
            let wei = self.rpc("get_balance", self.provider.get_balance(owner)).await?;
            return Ok(TokenAmount::new(wei, asset.decimals));
        }

        let contract = self.contract(asset)?;
        let request = TransactionRequest::default()
            .with_to(contract)
            .with_input(IERC20::balanceOfCall { owner }.abi_encode());
        let output = self.rpc("balance_of", self.provider.call(request)).await?;

        if output.len() < 32 {
            return Err(ChainError::InvalidResponse(format!(
                "balanceOf returned {} bytes",
                output.len()
            )));
        }
        Ok(TokenAmount::new(
            U256::from_be_slice(&output[..32]),
            asset.decimals,
        ))
    }

    async fn transfer(
        &self,
        signer: &SigningMaterial,
        to: &str,
        asset: &AssetConfig,
        amount: &TokenAmount,
    ) -> ChainResult<String> {
        let contract = self.contract(asset)?;
        let to = parse_evm(to)?;

        // Provider lives only as long as this call, and the signer with it
        let wallet = EthereumWallet::from(signer.evm_signer());
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(self.rpc_url.clone());

        let request = TransactionRequest::default()
            .with_to(contract)
            .with_input(IERC20::transferCall { to, amount: amount.raw }.abi_encode());

        let pending = self
            .rpc("send_transaction", provider.send_transaction(request))
            .await?;
        Ok(pending.tx_hash().to_string())
    }
}

impl std::fmt::Debug for EvmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmClient")
            .field("network", &self.network)
            .field("rpc_url", &self.rpc_url.host_str())
            .field("timeout_secs", &self.timeout_duration.as_secs())
            .finish()
    }
}

/// Map a provider error message onto the chain error taxonomy.
pub fn classify_rpc_error(message: &str) -> ChainError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
        ChainError::RateLimited
    } else if lower.contains("insufficient funds") {
        ChainError::InsufficientFee(message.to_string())
    } else if lower.contains("execution reverted")
        || lower.contains("nonce too low")
        || lower.contains("replacement transaction underpriced")
    {
        ChainError::Rejected(message.to_string())
    } else {
        ChainError::Rpc(message.to_string())
    }
}
