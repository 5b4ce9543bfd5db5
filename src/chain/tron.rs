//! TRON adapter over a TronGrid-compatible HTTP API.
//!
//! Reads go through the `/v1` indexer endpoints and the `/wallet` node
//! endpoints. Transactions are built by the node, checked against their
//! `txID`, signed locally and broadcast.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::U256;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use url::Url;

use crate::chain::{merge_by_tx_hash, ChainAdapter};
use crate::chain::types::{ChainError, ChainResult, InboundTransfer, Network, TokenAmount};
use crate::config::{AssetConfig, NetworkConfig, SecretString};
use crate::keys::address::{tron_from_bytes, tron_to_bytes};
use crate::keys::SigningMaterial;
use crate::observability::metrics;
use crate::resilience::RateLimiter;

/// Header carrying the TronGrid API key.
pub const API_KEY_HEADER: &str = "TRON-PRO-API-KEY";

/// TRX has six decimals.
pub const TRX_DECIMALS: u8 = 6;

/// Page size for the `/v1` listing endpoints.
const PAGE_LIMIT: u32 = 200;

/// Upper bound on followed pages per listing.
const MAX_PAGES: usize = 5;

/// `getcandelegatedmaxsize` resource type for energy.
const RESOURCE_TYPE_ENERGY: u8 = 1;

/// Fee-capacity operations on the TRON resource model.
#[async_trait]
pub trait TronResourceApi: Send + Sync {
    /// Stake (in sun) `owner` can still delegate as energy.
    async fn delegatable_energy_stake(&self, owner: &str) -> ChainResult<u64>;

    /// Energy granted per staked TRX at the current network ratio.
    async fn energy_per_trx(&self) -> ChainResult<f64>;

    async fn delegate_energy(
        &self,
        owner: &SigningMaterial,
        receiver: &str,
        stake_sun: u64,
    ) -> ChainResult<String>;

    async fn undelegate_energy(
        &self,
        owner: &SigningMaterial,
        receiver: &str,
        stake_sun: u64,
    ) -> ChainResult<String>;
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    meta: PageMeta,
}

#[derive(Debug, Default, Deserialize)]
struct PageMeta {
    #[serde(default)]
    fingerprint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Trc20Entry {
    transaction_id: String,
    #[serde(default)]
    token_info: Option<TokenInfo>,
    from: String,
    to: String,
    #[serde(rename = "type", default)]
    kind: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    address: String,
}

#[derive(Debug, Deserialize)]
struct NativeEntry {
    #[serde(rename = "txID")]
    tx_id: String,
    #[serde(rename = "blockNumber", default)]
    block_number: Option<u64>,
    #[serde(default)]
    ret: Vec<ContractRet>,
    raw_data: RawData,
}

#[derive(Debug, Deserialize)]
struct ContractRet {
    #[serde(rename = "contractRet", default)]
    contract_ret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawData {
    #[serde(default)]
    contract: Vec<RawContract>,
}

#[derive(Debug, Deserialize)]
struct RawContract {
    #[serde(rename = "type")]
    kind: String,
    parameter: ContractParameter,
}

#[derive(Debug, Deserialize)]
struct ContractParameter {
    value: Value,
}

/// TRON HTTP client. One instance per configured endpoint.
pub struct TronClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<SecretString>,
    limiter: Arc<RateLimiter>,
    timeout_secs: u64,
    lookback_secs: u64,
    fee_limit_sun: u64,
}

impl TronClient {
    pub fn new(config: &NetworkConfig) -> ChainResult<Self> {
        // Relative joins need the trailing slash to keep any base path
        let mut base = config.rpc_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url: Url = base.parse().map_err(|e| {
            ChainError::Rpc(format!("Invalid TRON API URL '{}': {}", config.rpc_url, e))
        })?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ChainError::Rpc(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            limiter: Arc::new(RateLimiter::new(
                "tron",
                config.requests_per_second,
                config.burst,
            )),
            timeout_secs: config.request_timeout_secs,
            lookback_secs: config.lookback_secs,
            fee_limit_sun: config.fee_limit_sun,
        })
    }

    fn url(&self, path: &str) -> ChainResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ChainError::Rpc(format!("bad path {}: {}", path, e)))
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> ChainResult<Value> {
        let request = self.http.get(self.url(path)?).query(query);
        self.send(request, path).await
    }

    async fn post(&self, path: &str, body: Value) -> ChainResult<Value> {
        let request = self.http.post(self.url(path)?).json(&body);
        self.send(request, path).await
    }

    async fn send(&self, request: reqwest::RequestBuilder, path: &str) -> ChainResult<Value> {
        self.limiter.acquire().await;

        let request = match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key.expose()),
            None => request,
        };

        let response = request.send().await.map_err(|e| {
            metrics::record_provider_error(Network::Tron, "request");
            if e.is_timeout() {
                ChainError::Timeout(self.timeout_secs)
            } else {
                ChainError::Rpc(format!("{}: {}", path, e.without_url()))
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            metrics::record_provider_error(Network::Tron, "rate_limited");
            return Err(ChainError::RateLimited);
        }
        if !status.is_success() {
            metrics::record_provider_error(Network::Tron, "status");
            return Err(ChainError::Rpc(format!("{} returned {}", path, status)));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ChainError::InvalidResponse(format!("{}: {}", path, e)))
    }

    /// Current head block number.
    pub async fn head_block(&self) -> ChainResult<u64> {
        let block = self.post("wallet/getnowblock", json!({})).await?;
        block
            .pointer("/block_header/raw_data/number")
            .and_then(Value::as_u64)
            .ok_or_else(|| ChainError::InvalidResponse("getnowblock: missing number".into()))
    }

    /// Block a transaction was included in, if any yet.
    async fn transaction_block(&self, tx_id: &str) -> ChainResult<Option<u64>> {
        let info = self
            .post("wallet/gettransactioninfobyid", json!({ "value": tx_id }))
            .await?;
        Ok(info.get("blockNumber").and_then(Value::as_u64))
    }

    fn min_timestamp_ms(&self) -> i64 {
        let lookback = chrono::Duration::seconds(self.lookback_secs as i64);
        (chrono::Utc::now() - lookback).timestamp_millis()
    }

    async fn list_pages<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        mut query: Vec<(&'static str, String)>,
    ) -> ChainResult<Vec<T>> {
        let mut entries = Vec::new();
        for _ in 0..MAX_PAGES {
            let raw = self.get(path, &query).await?;
            let page: Page<T> = serde_json::from_value(raw)
                .map_err(|e| ChainError::InvalidResponse(format!("{}: {}", path, e)))?;
            if page.success == Some(false) {
                return Err(ChainError::Rpc(format!("{} reported failure", path)));
            }
            entries.extend(page.data);

            match page.meta.fingerprint {
                Some(fingerprint) => {
                    query.retain(|(k, _)| *k != "fingerprint");
                    query.push(("fingerprint", fingerprint));
                }
                None => break,
            }
        }
        Ok(entries)
    }

    async fn trc20_transfers(
        &self,
        address: &str,
        contract: &str,
        decimals: u8,
    ) -> ChainResult<Vec<InboundTransfer>> {
        let path = format!("v1/accounts/{}/transactions/trc20", address);
        let entries: Vec<Trc20Entry> = self
            .list_pages(
                &path,
                vec![
                    ("only_to", "true".to_string()),
                    ("contract_address", contract.to_string()),
                    ("min_timestamp", self.min_timestamp_ms().to_string()),
                    ("limit", PAGE_LIMIT.to_string()),
                ],
            )
            .await?;

        let transfers = parse_trc20_entries(entries, address, contract, decimals)?;
        if transfers.is_empty() {
            return Ok(transfers);
        }

        let head = self.head_block().await?;
        let mut resolved = Vec::with_capacity(transfers.len());
        for mut transfer in transfers {
            transfer.confirmations = match self.transaction_block(&transfer.tx_hash).await? {
                Some(block) => head.saturating_sub(block),
                None => 0,
            };
            resolved.push(transfer);
        }
        Ok(merge_by_tx_hash(resolved))
    }

    async fn trx_transfers(&self, address: &str) -> ChainResult<Vec<InboundTransfer>> {
        let path = format!("v1/accounts/{}/transactions", address);
        let entries: Vec<NativeEntry> = self
            .list_pages(
                &path,
                vec![
                    ("only_to", "true".to_string()),
                    ("min_timestamp", self.min_timestamp_ms().to_string()),
                    ("limit", PAGE_LIMIT.to_string()),
                ],
            )
            .await?;

        let head = self.head_block().await?;
        Ok(merge_by_tx_hash(parse_native_entries(entries, address, head)))
    }

    async fn trc20_balance(&self, address: &str, contract: &str, decimals: u8) -> ChainResult<TokenAmount> {
        let result = self
            .post(
                "wallet/triggerconstantcontract",
                json!({
                    "owner_address": address,
                    "contract_address": contract,
                    "function_selector": "balanceOf(address)",
                    "parameter": encode_address_param(address)?,
                    "visible": true,
                }),
            )
            .await?;

        let word = result
            .pointer("/constant_result/0")
            .and_then(Value::as_str)
            .ok_or_else(|| ChainError::InvalidResponse(format!("balanceOf: {}", node_message(&result))))?;
        let raw = U256::from_str_radix(word, 16)
            .map_err(|_| ChainError::InvalidResponse(format!("balanceOf word '{}'", word)))?;
        Ok(TokenAmount::new(raw, decimals))
    }

    async fn trx_balance(&self, address: &str) -> ChainResult<TokenAmount> {
        let account = self
            .post("wallet/getaccount", json!({ "address": address, "visible": true }))
            .await?;
        // Accounts with no balance omit the field entirely
        let sun = account.get("balance").and_then(Value::as_u64).unwrap_or(0);
        Ok(TokenAmount::new(U256::from(sun), TRX_DECIMALS))
    }

    /// Verify, sign and broadcast a node-built transaction.
    async fn sign_and_broadcast(&self, signer: &SigningMaterial, mut tx: Value) -> ChainResult<String> {
        let digest = verified_digest(&tx)?;
        let signature = signer
            .sign_digest(&digest)
            .map_err(|e| ChainError::Rejected(e.to_string()))?;
        tx["signature"] = json!([hex::encode(signature)]);

        let result = self.post("wallet/broadcasttransaction", tx).await?;
        if result.get("result").and_then(Value::as_bool) == Some(true) {
            return Ok(hex::encode(digest));
        }
        Err(classify_broadcast_failure(&result))
    }

    /// Build a transaction through a `/wallet` endpoint and reject node errors.
    async fn build(&self, path: &str, body: Value) -> ChainResult<Value> {
        let response = self.post(path, body).await?;

        // triggersmartcontract wraps the transaction; the others return it bare
        if let Some(result) = response.get("result") {
            if result.get("result").and_then(Value::as_bool) != Some(true) {
                return Err(classify_broadcast_failure(result));
            }
        }
        let tx = response.get("transaction").cloned().unwrap_or(response);
        if tx.get("txID").is_none() {
            return Err(classify_broadcast_failure(&tx));
        }
        Ok(tx)
    }
}

#[async_trait]
impl ChainAdapter for TronClient {
    fn network(&self) -> Network {
        Network::Tron
    }

    async fn incoming_transfers(
        &self,
        address: &str,
        asset: &AssetConfig,
    ) -> ChainResult<Vec<InboundTransfer>> {
        match &asset.contract {
            Some(contract) => self.trc20_transfers(address, contract, asset.decimals).await,
            None => self.trx_transfers(address).await,
        }
    }

    async fn balance(&self, address: &str, asset: &AssetConfig) -> ChainResult<TokenAmount> {
        match &asset.contract {
            Some(contract) => self.trc20_balance(address, contract, asset.decimals).await,
            None => self.trx_balance(address).await,
        }
    }

    async fn transfer(
        &self,
        signer: &SigningMaterial,
        to: &str,
        asset: &AssetConfig,
        amount: &TokenAmount,
    ) -> ChainResult<String> {
        tron_to_bytes(to)?;

        let tx = match &asset.contract {
            Some(contract) => {
                let parameter = format!(
                    "{}{}",
                    encode_address_param(to)?,
                    hex::encode(amount.raw.to_be_bytes::<32>())
                );
                self.build(
                    "wallet/triggersmartcontract",
                    json!({
                        "owner_address": signer.address(),
                        "contract_address": contract,
                        "function_selector": "transfer(address,uint256)",
                        "parameter": parameter,
                        "fee_limit": self.fee_limit_sun,
                        "call_value": 0,
                        "visible": true,
                    }),
                )
                .await?
            }
            None => {
                let sun = u64::try_from(amount.raw)
                    .map_err(|_| ChainError::Rejected("TRX amount exceeds u64".into()))?;
                self.build(
                    "wallet/createtransaction",
                    json!({
                        "owner_address": signer.address(),
                        "to_address": to,
                        "amount": sun,
                        "visible": true,
                    }),
                )
                .await?
            }
        };

        self.sign_and_broadcast(signer, tx).await
    }
}

#[async_trait]
impl TronResourceApi for TronClient {
    async fn delegatable_energy_stake(&self, owner: &str) -> ChainResult<u64> {
        let result = self
            .post(
                "wallet/getcandelegatedmaxsize",
                json!({ "owner_address": owner, "type": RESOURCE_TYPE_ENERGY, "visible": true }),
            )
            .await?;
        Ok(result.get("max_size").and_then(Value::as_u64).unwrap_or(0))
    }

    async fn energy_per_trx(&self) -> ChainResult<f64> {
        // Any address works; the totals are network-wide
        let any_account = tron_from_bytes(&[0u8; 20]);
        let result = self
            .post(
                "wallet/getaccountresource",
                json!({ "address": any_account, "visible": true }),
            )
            .await?;
        energy_ratio(&result)
    }

    async fn delegate_energy(
        &self,
        owner: &SigningMaterial,
        receiver: &str,
        stake_sun: u64,
    ) -> ChainResult<String> {
        let tx = self
            .build(
                "wallet/delegateresource",
                json!({
                    "owner_address": owner.address(),
                    "receiver_address": receiver,
                    "balance": stake_sun,
                    "resource": "ENERGY",
                    "lock": false,
                    "visible": true,
                }),
            )
            .await?;
        self.sign_and_broadcast(owner, tx).await
    }

    async fn undelegate_energy(
        &self,
        owner: &SigningMaterial,
        receiver: &str,
        stake_sun: u64,
    ) -> ChainResult<String> {
        let tx = self
            .build(
                "wallet/undelegateresource",
                json!({
                    "owner_address": owner.address(),
                    "receiver_address": receiver,
                    "balance": stake_sun,
                    "resource": "ENERGY",
                    "visible": true,
                }),
            )
            .await?;
        self.sign_and_broadcast(owner, tx).await
    }
}

impl std::fmt::Debug for TronClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TronClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// ABI word for an address parameter: 12 zero bytes then the account id.
fn encode_address_param(address: &str) -> ChainResult<String> {
    let id = tron_to_bytes(address)?;
    Ok(format!("{}{}", "0".repeat(24), hex::encode(id)))
}

fn parse_trc20_entries(
    entries: Vec<Trc20Entry>,
    address: &str,
    contract: &str,
    decimals: u8,
) -> ChainResult<Vec<InboundTransfer>> {
    let mut transfers = Vec::new();
    for entry in entries {
        let token_matches = entry
            .token_info
            .as_ref()
            .map_or(true, |t| t.address == contract);
        if entry.to != address || !token_matches || (!entry.kind.is_empty() && entry.kind != "Transfer") {
            continue;
        }
        let raw: U256 = entry.value.parse().map_err(|_| {
            ChainError::InvalidResponse(format!("trc20 value '{}'", entry.value))
        })?;
        transfers.push(InboundTransfer {
            tx_hash: entry.transaction_id,
            from: entry.from,
            to: entry.to,
            amount: TokenAmount::new(raw, decimals),
            confirmations: 0,
        });
    }
    Ok(transfers)
}

fn parse_native_entries(entries: Vec<NativeEntry>, address: &str, head: u64) -> Vec<InboundTransfer> {
    let mut transfers = Vec::new();
    for entry in entries {
        let succeeded = entry
            .ret
            .first()
            .and_then(|r| r.contract_ret.as_deref())
            .map_or(false, |r| r == "SUCCESS");
        let Some(contract) = entry.raw_data.contract.first() else {
            continue;
        };
        if !succeeded || contract.kind != "TransferContract" {
            continue;
        }

        let value = &contract.parameter.value;
        let to = value
            .get("to_address")
            .and_then(Value::as_str)
            .and_then(hex_to_tron);
        let from = value
            .get("owner_address")
            .and_then(Value::as_str)
            .and_then(hex_to_tron)
            .unwrap_or_default();
        let amount = value.get("amount").and_then(Value::as_u64).unwrap_or(0);
        if to.as_deref() != Some(address) || amount == 0 {
            continue;
        }

        transfers.push(InboundTransfer {
            tx_hash: entry.tx_id,
            from,
            to: address.to_string(),
            amount: TokenAmount::new(U256::from(amount), TRX_DECIMALS),
            confirmations: entry
                .block_number
                .map_or(0, |block| head.saturating_sub(block)),
        });
    }
    transfers
}

/// `41…` hex address to Base58Check. Already-encoded input passes through.
fn hex_to_tron(value: &str) -> Option<String> {
    if value.starts_with('T') {
        return Some(value.to_string());
    }
    let bytes = hex::decode(value).ok()?;
    if bytes.len() != 21 {
        return None;
    }
    let mut id = [0u8; 20];
    id.copy_from_slice(&bytes[1..]);
    Some(tron_from_bytes(&id))
}

/// The node's `txID` must be the SHA-256 of `raw_data_hex`; anything else
/// means the node handed back a transaction we did not ask for.
fn verified_digest(tx: &Value) -> ChainResult<[u8; 32]> {
    let tx_id = tx
        .get("txID")
        .and_then(Value::as_str)
        .ok_or_else(|| ChainError::InvalidResponse("transaction without txID".into()))?;
    let raw_hex = tx
        .get("raw_data_hex")
        .and_then(Value::as_str)
        .ok_or_else(|| ChainError::InvalidResponse("transaction without raw_data_hex".into()))?;

    let raw = hex::decode(raw_hex)
        .map_err(|_| ChainError::InvalidResponse("raw_data_hex is not hex".into()))?;
    let digest: [u8; 32] = Sha256::digest(&raw).into();
    if hex::encode(digest) != tx_id.to_ascii_lowercase() {
        return Err(ChainError::InvalidResponse("txID does not match raw_data_hex".into()));
    }
    Ok(digest)
}

/// Node error messages are often hex-encoded UTF-8.
fn node_message(result: &Value) -> String {
    let raw = result
        .get("message")
        .or_else(|| result.get("Error"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    hex::decode(raw)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| raw.to_string())
}

fn classify_broadcast_failure(result: &Value) -> ChainError {
    let code = result.get("code").and_then(Value::as_str).unwrap_or_default();
    let message = node_message(result);
    let lower = message.to_ascii_lowercase();

    if code == "BANDWITH_ERROR"
        || lower.contains("balance is not sufficient")
        || lower.contains("not enough energy")
        || lower.contains("out_of_energy")
        || lower.contains("account resource insufficient")
    {
        return ChainError::InsufficientFee(message);
    }
    if code == "SERVER_BUSY" || code == "NOT_ENOUGH_EFFECTIVE_CONNECTION" {
        return ChainError::Rpc(format!("{}: {}", code, message));
    }
    if code.is_empty() && message.is_empty() {
        return ChainError::InvalidResponse(result.to_string());
    }
    ChainError::Rejected(format!("{} {}", code, message).trim().to_string())
}

fn energy_ratio(resource: &Value) -> ChainResult<f64> {
    let limit = resource.get("TotalEnergyLimit").and_then(Value::as_f64);
    let weight = resource.get("TotalEnergyWeight").and_then(Value::as_f64);
    match (limit, weight) {
        (Some(limit), Some(weight)) if weight > 0.0 => Ok(limit / weight),
        _ => Err(ChainError::InvalidResponse(
            "getaccountresource: missing energy totals".into(),
        )),
    }
}
