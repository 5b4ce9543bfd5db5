//! Deposit confirmation state machine.
//!
//! `reconcile` decides what a single observation of a transfer does to the
//! stored deposit. It is pure so the monitor's bookkeeping can be tested
//! without a chain or a store.

use rust_decimal::Decimal;

use crate::store::types::{Deposit, DepositStatus};

/// Why an observation leaves state untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Unseen transfer below the asset's minimum deposit.
    Dust,
    /// Same confirmation count as stored.
    Unchanged,
    /// Provider reported fewer confirmations than stored (reorg or lagging node).
    Regression,
    /// Deposit is past PENDING; confirmations are no longer tracked.
    Settled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    Skip(SkipReason),
    /// Create a deposit in the given status (PENDING or CONFIRMED).
    Create { status: DepositStatus },
    /// Raise the stored confirmation count; still PENDING.
    RaiseConfirmations { confirmations: u64 },
    /// PENDING → CONFIRMED.
    Confirm { confirmations: u64 },
}

/// One observation of a transfer.
#[derive(Debug, Clone, Copy)]
pub struct Observation {
    pub amount: Decimal,
    pub confirmations: u64,
}

pub fn reconcile(
    existing: Option<&Deposit>,
    observed: Observation,
    min_deposit: Decimal,
    required_confirmations: u64,
) -> ReconcileAction {
    let Some(deposit) = existing else {
        if observed.amount <= Decimal::ZERO || observed.amount < min_deposit {
            return ReconcileAction::Skip(SkipReason::Dust);
        }
        let status = if observed.confirmations >= required_confirmations {
            DepositStatus::Confirmed
        } else {
            DepositStatus::Pending
        };
        return ReconcileAction::Create { status };
    };

    if deposit.status != DepositStatus::Pending {
        return ReconcileAction::Skip(SkipReason::Settled);
    }
    if observed.confirmations < deposit.confirmations {
        return ReconcileAction::Skip(SkipReason::Regression);
    }
    if observed.confirmations >= required_confirmations {
        return ReconcileAction::Confirm {
            confirmations: observed.confirmations,
        };
    }
    if observed.confirmations > deposit.confirmations {
        return ReconcileAction::RaiseConfirmations {
            confirmations: observed.confirmations,
        };
    }
    ReconcileAction::Skip(SkipReason::Unchanged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::types::Network;
    use chrono::Utc;
    use std::str::FromStr;
    use uuid::Uuid;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn seen(status: DepositStatus, confirmations: u64) -> Deposit {
        Deposit {
            id: Uuid::new_v4(),
            address_ref: Uuid::new_v4(),
            tx_hash: "abc123".into(),
            network: Network::Tron,
            asset: "USDT".into(),
            amount: dec("100.50"),
            confirmations,
            status,
            detected_at: Utc::now(),
            confirmed_at: None,
            credited_at: None,
            swept_at: None,
            sweep_tx_hash: None,
        }
    }

    fn obs(amount: &str, confirmations: u64) -> Observation {
        Observation {
            amount: dec(amount),
            confirmations,
        }
    }

    #[test]
    fn test_new_transfer() {
        assert_eq!(
            reconcile(None, obs("100.50", 0), dec("1"), 19),
            ReconcileAction::Create { status: DepositStatus::Pending }
        );
        // Already deep enough on first sight
        assert_eq!(
            reconcile(None, obs("100.50", 19), dec("1"), 19),
            ReconcileAction::Create { status: DepositStatus::Confirmed }
        );
    }

    #[test]
    fn test_dust_is_skipped() {
        assert_eq!(
            reconcile(None, obs("0.99", 50), dec("1"), 19),
            ReconcileAction::Skip(SkipReason::Dust)
        );
        assert_eq!(
            reconcile(None, obs("0", 50), Decimal::ZERO, 19),
            ReconcileAction::Skip(SkipReason::Dust)
        );
        // Exactly the minimum is accepted
        assert!(matches!(
            reconcile(None, obs("1", 0), dec("1"), 19),
            ReconcileAction::Create { .. }
        ));
    }

    #[test]
    fn test_pending_progress() {
        let pending = seen(DepositStatus::Pending, 5);
        assert_eq!(
            reconcile(Some(&pending), obs("100.50", 8), dec("1"), 19),
            ReconcileAction::RaiseConfirmations { confirmations: 8 }
        );
        assert_eq!(
            reconcile(Some(&pending), obs("100.50", 5), dec("1"), 19),
            ReconcileAction::Skip(SkipReason::Unchanged)
        );
        assert_eq!(
            reconcile(Some(&pending), obs("100.50", 3), dec("1"), 19),
            ReconcileAction::Skip(SkipReason::Regression)
        );
        assert_eq!(
            reconcile(Some(&pending), obs("100.50", 20), dec("1"), 19),
            ReconcileAction::Confirm { confirmations: 20 }
        );
    }

    #[test]
    fn test_settled_deposits_ignore_updates() {
        for status in [DepositStatus::Confirmed, DepositStatus::Credited, DepositStatus::Swept] {
            let deposit = seen(status, 20);
            assert_eq!(
                reconcile(Some(&deposit), obs("100.50", 40), dec("1"), 19),
                ReconcileAction::Skip(SkipReason::Settled)
            );
        }
    }

    #[test]
    fn test_existing_below_minimum_still_tracked() {
        // Threshold only gates creation
        let pending = seen(DepositStatus::Pending, 0);
        assert_eq!(
            reconcile(Some(&pending), obs("0.01", 20), dec("1"), 19),
            ReconcileAction::Confirm { confirmations: 20 }
        );
    }
}
