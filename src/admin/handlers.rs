use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::admin::AdminState;
use crate::chain::Network;
use crate::engine::CycleSummary;
use crate::error::CustodyError;
use crate::keys::{provision_address, KeyError};
use crate::pricing::PriceQuote;
use crate::store::types::{CustodialAddress, Deposit, DepositStatus};
use crate::store::{DepositStore, StoreError};

/// JSON error body with a matching status code.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status = match &e {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::InvalidTransition { .. } => StatusCode::CONFLICT,
            StoreError::Duplicate(_) => StatusCode::CONFLICT,
            StoreError::Io(_) | StoreError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        ApiError::new(status, e.to_string())
    }
}

impl From<CustodyError> for ApiError {
    fn from(e: CustodyError) -> Self {
        match e {
            CustodyError::Store(e) => e.into(),
            CustodyError::Key(KeyError::NotConfigured) => {
                ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "master seed not configured")
            }
            CustodyError::InvalidRequest(_) | CustodyError::UnknownAsset { .. } => {
                ApiError::new(StatusCode::BAD_REQUEST, e.to_string())
            }
            other => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub version: &'static str,
    pub cycles: u64,
    pub last_cycle: Option<CycleSummary>,
    pub deposits: BTreeMap<DepositStatus, usize>,
    pub pending_reclaims: usize,
    pub price: Option<PriceQuote>,
    pub signing_enabled: bool,
}

pub async fn get_status(State(state): State<AdminState>) -> Result<Json<EngineStatus>, ApiError> {
    let pending_reclaims = match &state.reclaims {
        Some(queue) => queue.pending_count().await?,
        None => 0,
    };

    Ok(Json(EngineStatus {
        version: env!("CARGO_PKG_VERSION"),
        cycles: state.stats.cycles(),
        last_cycle: state.stats.last_cycle().map(|s| s.as_ref().clone()),
        deposits: state.store.status_summary().into_iter().collect(),
        pending_reclaims,
        price: state.price.get().map(|q| q.as_ref().clone()),
        signing_enabled: state.keys.is_some(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct DepositFilter {
    pub status: Option<String>,
}

pub async fn list_deposits(
    State(state): State<AdminState>,
    Query(filter): Query<DepositFilter>,
) -> Result<Json<Vec<Deposit>>, ApiError> {
    let status = filter
        .status
        .as_deref()
        .map(str::parse::<DepositStatus>)
        .transpose()
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e))?;

    Ok(Json(state.store.list_deposits(status).await?))
}

/// The ledger's write path for CREDITED. Only a CONFIRMED deposit may be
/// credited.
pub async fn mark_credited(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Deposit>, ApiError> {
    let deposit = state.store.mark_credited(id, Utc::now()).await?;
    tracing::info!(
        deposit_id = %deposit.id,
        tx_hash = %deposit.tx_hash,
        amount = %deposit.amount,
        "Deposit credited by ledger"
    );
    if let Err(e) = state.store.save_to_file() {
        tracing::error!(error = %e, "Failed to save snapshot after credit");
    }
    Ok(Json(deposit))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    pub merchant_id: String,
    pub network: Network,
    pub asset: String,
}

pub async fn provision(
    State(state): State<AdminState>,
    Json(request): Json<ProvisionRequest>,
) -> Result<(StatusCode, Json<CustodialAddress>), ApiError> {
    if state.policy.asset(request.network, &request.asset).is_none() {
        return Err(CustodyError::UnknownAsset {
            network: request.network,
            asset: request.asset,
        }
        .into());
    }
    let keys = state
        .keys
        .as_deref()
        .ok_or(CustodyError::Key(KeyError::NotConfigured))?;

    let address = provision_address(
        keys,
        state.store.as_ref(),
        state.store.as_ref(),
        &request.merchant_id,
        request.network,
        &request.asset,
    )
    .await?;

    if let Err(e) = state.store.save_to_file() {
        tracing::error!(error = %e, "Failed to save snapshot after provisioning");
    }
    Ok((StatusCode::CREATED, Json(address)))
}
