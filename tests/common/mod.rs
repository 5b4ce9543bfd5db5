//! Shared fixtures for integration tests: a scripted chain adapter, a
//! scripted fee delegator and a mock ledger that records every call.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::net::TcpListener;

use custody_sweeper::chain::{
    ChainAdapter, ChainError, ChainRegistry, ChainResult, InboundTransfer, Network, TokenAmount,
};
use custody_sweeper::config::{
    AssetConfig, CustodyPolicy, DelegationConfig, LedgerConfig, SecretString, SweepConfig,
};
use custody_sweeper::keys::{provision_address, KeyDerivationService, SigningMaterial};
use custody_sweeper::monitor::WalletMonitor;
use custody_sweeper::notify::{EventSink, NotificationClient, INTERNAL_API_KEY_HEADER};
use custody_sweeper::store::{CustodialAddress, MemoryStore};
use custody_sweeper::sweep::{
    DelegationError, DelegationGrant, FeeDelegation, ReclaimQueue, SweepProcessor,
};

pub const TEST_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
pub const API_KEY: &str = "test-internal-key";
pub const HOT_WALLET: &str = "TLa2f6VPqDgRE67v1736s7bJ8Ray5wYjU7";
pub const USDT_DECIMALS: u8 = 6;

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn usdt(amount: &str) -> TokenAmount {
    TokenAmount::from_decimal(dec(amount), USDT_DECIMALS).unwrap()
}

pub fn usdt_asset() -> AssetConfig {
    AssetConfig {
        network: Network::Tron,
        symbol: "USDT".into(),
        contract: Some("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t".into()),
        decimals: USDT_DECIMALS,
        min_deposit: dec("1"),
        min_sweep: dec("50"),
        fee_reserve: Decimal::ZERO,
    }
}

pub fn tron_policy(required_confirmations: u64) -> Arc<CustodyPolicy> {
    Arc::new(
        CustodyPolicy::default()
            .with_asset(usdt_asset())
            .with_confirmations(Network::Tron, required_confirmations)
            .with_hot_wallet(Network::Tron, HOT_WALLET),
    )
}

pub fn keys() -> Arc<KeyDerivationService> {
    Arc::new(KeyDerivationService::from_mnemonic(TEST_MNEMONIC).unwrap())
}

pub async fn provision(store: &MemoryStore, keys: &KeyDerivationService) -> CustodialAddress {
    provision_address(keys, store, store, "merchant-1", Network::Tron, "USDT")
        .await
        .unwrap()
}

/// A submitted transfer as seen by the scripted chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTransfer {
    pub from: String,
    pub to: String,
    pub amount: TokenAmount,
}

/// Chain adapter driven entirely by test scripts.
pub struct ScriptedChain {
    network: Network,
    transfers: Mutex<HashMap<String, Vec<InboundTransfer>>>,
    listing_errors: Mutex<HashMap<String, ChainError>>,
    balances: Mutex<HashMap<String, TokenAmount>>,
    transfer_results: Mutex<VecDeque<ChainResult<String>>>,
    sent: Mutex<Vec<SentTransfer>>,
}

impl ScriptedChain {
    pub fn new(network: Network) -> Arc<Self> {
        Arc::new(Self {
            network,
            transfers: Mutex::new(HashMap::new()),
            listing_errors: Mutex::new(HashMap::new()),
            balances: Mutex::new(HashMap::new()),
            transfer_results: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Replace what `incoming_transfers` reports for `to`.
    pub fn set_incoming(&self, to: &str, transfers: Vec<(&str, &str, u64)>) {
        let list = transfers
            .into_iter()
            .map(|(tx_hash, amount, confirmations)| InboundTransfer {
                tx_hash: tx_hash.to_string(),
                from: "TSenderAddressxxxxxxxxxxxxxxxxxxxx".to_string(),
                to: to.to_string(),
                amount: usdt(amount),
                confirmations,
            })
            .collect();
        self.transfers.lock().unwrap().insert(to.to_string(), list);
    }

    /// Make `incoming_transfers` for `address` fail until cleared.
    pub fn fail_listing(&self, address: &str, error: ChainError) {
        self.listing_errors
            .lock()
            .unwrap()
            .insert(address.to_string(), error);
    }

    pub fn clear_listing_failure(&self, address: &str) {
        self.listing_errors.lock().unwrap().remove(address);
    }

    pub fn set_balance(&self, address: &str, amount: &str) {
        self.balances
            .lock()
            .unwrap()
            .insert(address.to_string(), usdt(amount));
    }

    pub fn push_transfer_result(&self, result: ChainResult<String>) {
        self.transfer_results.lock().unwrap().push_back(result);
    }

    pub fn sent(&self) -> Vec<SentTransfer> {
        self.sent.lock().unwrap().clone()
    }

    pub fn registry(self: &Arc<Self>) -> ChainRegistry {
        ChainRegistry::new().with(self.clone())
    }
}

#[async_trait]
impl ChainAdapter for ScriptedChain {
    fn network(&self) -> Network {
        self.network
    }

    async fn incoming_transfers(
        &self,
        address: &str,
        _asset: &AssetConfig,
    ) -> ChainResult<Vec<InboundTransfer>> {
        if let Some(error) = self.listing_errors.lock().unwrap().get(address) {
            return Err(error.clone());
        }
        Ok(self
            .transfers
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    async fn balance(&self, address: &str, asset: &AssetConfig) -> ChainResult<TokenAmount> {
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(address)
            .copied()
            .unwrap_or_else(|| TokenAmount::zero(asset.decimals)))
    }

    async fn transfer(
        &self,
        signer: &SigningMaterial,
        to: &str,
        _asset: &AssetConfig,
        amount: &TokenAmount,
    ) -> ChainResult<String> {
        let result = self
            .transfer_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ChainError::Rpc("no scripted transfer result".into())));
        if result.is_ok() {
            self.sent.lock().unwrap().push(SentTransfer {
                from: signer.address().to_string(),
                to: to.to_string(),
                amount: *amount,
            });
            self.balances
                .lock()
                .unwrap()
                .insert(signer.address().to_string(), TokenAmount::zero(amount.decimals));
        }
        result
    }
}

/// Fee delegator with scripted delegate results. Reclaims always succeed.
pub struct ScriptedDelegation {
    delegate_results: Mutex<VecDeque<Result<u64, DelegationError>>>,
    reclaimed: Mutex<Vec<DelegationGrant>>,
}

impl ScriptedDelegation {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            delegate_results: Mutex::new(VecDeque::new()),
            reclaimed: Mutex::new(Vec::new()),
        })
    }

    pub fn push_delegate_result(&self, result: Result<u64, DelegationError>) {
        self.delegate_results.lock().unwrap().push_back(result);
    }

    pub fn reclaimed(&self) -> Vec<DelegationGrant> {
        self.reclaimed.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeeDelegation for ScriptedDelegation {
    fn network(&self) -> Network {
        Network::Tron
    }

    async fn delegate(&self, receiver: &str) -> Result<DelegationGrant, DelegationError> {
        let amount = self
            .delegate_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(130_000_000))?;
        Ok(DelegationGrant {
            network: Network::Tron,
            receiver: receiver.to_string(),
            amount,
            tx_hash: format!("delegate-{}", receiver),
            delegated_at: Utc::now(),
        })
    }

    async fn reclaim(&self, grant: &DelegationGrant) -> Result<String, DelegationError> {
        self.reclaimed.lock().unwrap().push(grant.clone());
        Ok(format!("undelegate-{}", grant.receiver))
    }
}

/// One call received by the mock ledger.
#[derive(Debug, Clone)]
pub struct LedgerCall {
    pub kind: String,
    pub api_key: Option<String>,
    pub body: Value,
}

#[derive(Clone, Default)]
pub struct MockLedger {
    calls: Arc<Mutex<Vec<LedgerCall>>>,
}

impl MockLedger {
    /// Bind on an ephemeral port and return the ledger with its base URL.
    pub async fn start() -> (Self, String) {
        let ledger = MockLedger::default();
        let app = Router::new()
            .route("/internal/webhooks/{kind}", post(record_call))
            .with_state(ledger.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        (ledger, format!("http://{}/internal/webhooks/", addr))
    }

    pub fn calls(&self) -> Vec<LedgerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, kind: &str) -> Vec<LedgerCall> {
        self.calls().into_iter().filter(|c| c.kind == kind).collect()
    }
}

async fn record_call(
    State(ledger): State<MockLedger>,
    Path(kind): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    ledger.calls.lock().unwrap().push(LedgerCall {
        kind,
        api_key: headers
            .get(INTERNAL_API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });
    StatusCode::OK
}

pub fn notification_client(base_url: &str) -> Arc<dyn EventSink> {
    let config = LedgerConfig {
        base_url: base_url.to_string(),
        timeout_secs: 5,
    };
    Arc::new(NotificationClient::new(&config, Some(SecretString::new(API_KEY))).unwrap())
}

/// A complete monitor + sweeper pair over one store and one chain.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub chain: Arc<ScriptedChain>,
    pub delegation: Arc<ScriptedDelegation>,
    pub reclaims: Arc<ReclaimQueue>,
    pub monitor: WalletMonitor,
    pub sweeper: SweepProcessor,
    pub ledger: MockLedger,
    pub keys: Arc<KeyDerivationService>,
}

impl Harness {
    pub async fn new(required_confirmations: u64) -> Self {
        Self::with_store(required_confirmations, Arc::new(MemoryStore::new(None))).await
    }

    pub async fn with_store(required_confirmations: u64, store: Arc<MemoryStore>) -> Self {
        let (ledger, base_url) = MockLedger::start().await;
        let chain = ScriptedChain::new(Network::Tron);
        let delegation = ScriptedDelegation::new();
        let keys = keys();
        let policy = tron_policy(required_confirmations);
        let sink = notification_client(&base_url);

        let delegation_config = DelegationConfig {
            reclaim_delay_secs: 0,
            ..DelegationConfig::default()
        };
        let reclaims = Arc::new(
            ReclaimQueue::new(store.clone(), delegation_config)
                .with_delegator(delegation.clone()),
        );

        let monitor = WalletMonitor::new(
            chain.registry(),
            store.clone(),
            store.clone(),
            sink.clone(),
            policy.clone(),
        );
        let sweep_config = SweepConfig {
            enabled: true,
            attempts_per_minute: 6_000.0,
        };
        let sweeper = SweepProcessor::new(
            chain.registry(),
            store.clone(),
            store.clone(),
            sink,
            policy,
            Some(keys.clone()),
            &sweep_config,
        )
        .with_delegator(delegation.clone())
        .with_reclaim_queue(reclaims.clone());

        Self {
            store,
            chain,
            delegation,
            reclaims,
            monitor,
            sweeper,
            ledger,
            keys,
        }
    }
}
