//! Events reported to the external ledger.
//!
//! The set is closed: each variant has a fixed payload shape and an event
//! kind that selects the endpoint. Bodies carry only the payload fields.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chain::types::{format_amount, Network};
use crate::notify::{NotifyError, NotifyResult};
use crate::store::types::{CustodialAddress, Deposit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    DepositDetected,
    DepositConfirmed,
    DepositSwept,
}

impl EventKind {
    /// Path segment and metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::DepositDetected => "deposit-detected",
            EventKind::DepositConfirmed => "deposit-confirmed",
            EventKind::DepositSwept => "deposit-swept",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositDetected {
    pub wallet_address: String,
    pub tx_hash: String,
    pub network: Network,
    pub asset: String,
    pub amount: String,
    pub confirmations: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositConfirmed {
    pub deposit_id: Uuid,
    pub tx_hash: String,
    pub confirmations: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositSwept {
    pub deposit_id: Uuid,
    pub sweep_tx_hash: String,
    pub amount_swept: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LedgerEvent {
    Detected(DepositDetected),
    Confirmed(DepositConfirmed),
    Swept(DepositSwept),
}

impl LedgerEvent {
    pub fn detected(address: &CustodialAddress, deposit: &Deposit) -> Self {
        LedgerEvent::Detected(DepositDetected {
            wallet_address: address.address.clone(),
            tx_hash: deposit.tx_hash.clone(),
            network: deposit.network,
            asset: deposit.asset.clone(),
            amount: format_amount(deposit.amount),
            confirmations: deposit.confirmations,
        })
    }

    pub fn confirmed(deposit: &Deposit) -> Self {
        LedgerEvent::Confirmed(DepositConfirmed {
            deposit_id: deposit.id,
            tx_hash: deposit.tx_hash.clone(),
            confirmations: deposit.confirmations,
        })
    }

    /// `amount_swept` is the whole consolidated balance of the address.
    pub fn swept(deposit: &Deposit, sweep_tx_hash: &str, amount_swept: Decimal) -> Self {
        LedgerEvent::Swept(DepositSwept {
            deposit_id: deposit.id,
            sweep_tx_hash: sweep_tx_hash.to_string(),
            amount_swept: format_amount(amount_swept),
        })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            LedgerEvent::Detected(_) => EventKind::DepositDetected,
            LedgerEvent::Confirmed(_) => EventKind::DepositConfirmed,
            LedgerEvent::Swept(_) => EventKind::DepositSwept,
        }
    }

    /// Reject payloads the ledger could not act on.
    pub fn validate(&self) -> NotifyResult<()> {
        let invalid = |reason: &str| Err(NotifyError::InvalidEvent(format!("{}: {}", self.kind(), reason)));
        match self {
            LedgerEvent::Detected(e) => {
                if e.wallet_address.is_empty() {
                    return invalid("empty wallet address");
                }
                if e.tx_hash.is_empty() {
                    return invalid("empty tx hash");
                }
                if e.asset.is_empty() {
                    return invalid("empty asset");
                }
                if !is_positive_amount(&e.amount) {
                    return invalid("amount must be positive");
                }
            }
            LedgerEvent::Confirmed(e) => {
                if e.tx_hash.is_empty() {
                    return invalid("empty tx hash");
                }
            }
            LedgerEvent::Swept(e) => {
                if e.sweep_tx_hash.is_empty() {
                    return invalid("empty sweep tx hash");
                }
                if !is_positive_amount(&e.amount_swept) {
                    return invalid("amount must be positive");
                }
            }
        }
        Ok(())
    }

    /// Correlation value for logs.
    pub fn tx_hash(&self) -> &str {
        match self {
            LedgerEvent::Detected(e) => &e.tx_hash,
            LedgerEvent::Confirmed(e) => &e.tx_hash,
            LedgerEvent::Swept(e) => &e.sweep_tx_hash,
        }
    }
}

fn is_positive_amount(raw: &str) -> bool {
    raw.parse::<Decimal>().map_or(false, |d| d > Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::DepositStatus;
    use chrono::Utc;
    use serde_json::json;
    use std::str::FromStr;

    fn deposit() -> Deposit {
        Deposit {
            id: Uuid::nil(),
            address_ref: Uuid::nil(),
            tx_hash: "abc123".into(),
            network: Network::Tron,
            asset: "USDT".into(),
            amount: Decimal::from_str("100.50").unwrap(),
            confirmations: 0,
            status: DepositStatus::Pending,
            detected_at: Utc::now(),
            confirmed_at: None,
            credited_at: None,
            swept_at: None,
            sweep_tx_hash: None,
        }
    }

    fn address() -> CustodialAddress {
        CustodialAddress {
            id: Uuid::nil(),
            merchant_id: "m-1".into(),
            network: Network::Tron,
            asset: "USDT".into(),
            address: "TWallet".into(),
            derivation_index: 0,
            active: true,
        }
    }

    #[test]
    fn test_detected_payload_shape() {
        let event = LedgerEvent::detected(&address(), &deposit());
        assert_eq!(event.kind().as_str(), "deposit-detected");
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "walletAddress": "TWallet",
                "txHash": "abc123",
                "network": "tron",
                "asset": "USDT",
                "amount": "100.50",
                "confirmations": 0
            })
        );
    }

    #[test]
    fn test_swept_payload_shape() {
        let event = LedgerEvent::swept(&deposit(), "sweep789", Decimal::from_str("100.5").unwrap());
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "depositId": Uuid::nil(),
                "sweepTxHash": "sweep789",
                "amountSwept": "100.50"
            })
        );
    }

    #[test]
    fn test_validate() {
        assert!(LedgerEvent::confirmed(&deposit()).validate().is_ok());

        let mut empty = deposit();
        empty.tx_hash.clear();
        assert!(LedgerEvent::confirmed(&empty).validate().is_err());

        let zero = LedgerEvent::swept(&deposit(), "s", Decimal::ZERO);
        assert!(matches!(zero.validate(), Err(NotifyError::InvalidEvent(_))));
    }
}
