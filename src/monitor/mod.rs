//! Deposit monitoring subsystem.
//!
//! # Data Flow
//! ```text
//! WalletRegistry (active addresses)
//!     → ChainAdapter::incoming_transfers (per address, sequential)
//!     → state.rs (pure reconcile: create / raise / confirm / skip)
//!     → DepositStore (idempotent by tx_hash)
//!     → Notification Client (deposit-detected, deposit-confirmed)
//! ```

pub mod state;
pub mod wallet_monitor;

pub use state::{reconcile, Observation, ReconcileAction, SkipReason};
pub use wallet_monitor::{ScanReport, WalletMonitor};
