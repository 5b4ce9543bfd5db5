//! Treasury sweep subsystem.
//!
//! # Data Flow
//! ```text
//! DepositStore (addresses with CREDITED deposits)
//!     → ChainAdapter::balance (live, sequential)
//!     → processor.rs (threshold decision)
//!     → delegation.rs (lend fee capacity, TRON only)
//!     → ChainAdapter::transfer (entire balance to the hot wallet)
//!     → reclaim.rs (delegation taken back later, tracked and persisted)
//!     → DepositStore (SweepRecord, CREDITED → SWEPT) + deposit-swept events
//! ```
//!
//! # Operating Constraint
//! Full-balance sweeps assume a single writer: exactly one worker runs
//! this phase against a store.

pub mod delegation;
pub mod processor;
pub mod reclaim;

pub use delegation::{DelegationError, DelegationGrant, FeeDelegation, TronEnergyDelegation};
pub use processor::{sweep_decision, SweepDecision, SweepOutcome, SweepProcessor, SweepReport};
pub use reclaim::{ReclaimQueue, ReclaimReport, ReclaimState, ReclaimTask};
