//! Custody domain records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chain::types::Network;

/// A deposit-receiving address held on behalf of a merchant.
///
/// `address` is a pure function of (seed, network, derivation_index); no
/// key material is stored alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustodialAddress {
    pub id: Uuid,
    pub merchant_id: String,
    pub network: Network,
    pub asset: String,
    pub address: String,
    pub derivation_index: u32,
    pub active: bool,
}

/// Lifecycle of a deposit. Status only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepositStatus {
    Pending,
    Confirmed,
    /// Assigned only by the external ledger.
    Credited,
    Swept,
}

impl DepositStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositStatus::Pending => "PENDING",
            DepositStatus::Confirmed => "CONFIRMED",
            DepositStatus::Credited => "CREDITED",
            DepositStatus::Swept => "SWEPT",
        }
    }

    /// Whether `next` is the single legal successor of `self`.
    pub fn can_advance_to(&self, next: DepositStatus) -> bool {
        matches!(
            (self, next),
            (DepositStatus::Pending, DepositStatus::Confirmed)
                | (DepositStatus::Confirmed, DepositStatus::Credited)
                | (DepositStatus::Credited, DepositStatus::Swept)
        )
    }
}

impl std::fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DepositStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(DepositStatus::Pending),
            "CONFIRMED" => Ok(DepositStatus::Confirmed),
            "CREDITED" => Ok(DepositStatus::Credited),
            "SWEPT" => Ok(DepositStatus::Swept),
            other => Err(format!("unknown deposit status '{}'", other)),
        }
    }
}

/// An incoming transfer to a custodial address. `tx_hash` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deposit {
    pub id: Uuid,
    pub address_ref: Uuid,
    pub tx_hash: String,
    pub network: Network,
    pub asset: String,
    pub amount: Decimal,
    pub confirmations: u64,
    pub status: DepositStatus,
    pub detected_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub credited_at: Option<DateTime<Utc>>,
    pub swept_at: Option<DateTime<Utc>>,
    pub sweep_tx_hash: Option<String>,
}

/// Hot-wallet inbound ledger entry. Written once per consolidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepRecord {
    pub network: Network,
    pub asset: String,
    pub tx_hash: String,
    pub amount: Decimal,
    pub direction: SweepDirection,
    pub source_address: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SweepDirection {
    In,
}
