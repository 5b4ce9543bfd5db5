//! Ledger notification subsystem.
//!
//! # Data Flow
//! ```text
//! Wallet Monitor / Sweep Processor
//!     → events.rs (closed set of payloads, validated)
//!     → client.rs (POST {base_url}{kind} with x-internal-api-key)
//!     → external ledger
//! ```
//!
//! Delivery is synchronous and best-effort. A lost event is recovered by
//! state re-derivation on later cycles, not by retries here.

pub mod client;
pub mod events;

use thiserror::Error;

pub use client::{notify_best_effort, EventSink, NotificationClient, INTERNAL_API_KEY_HEADER};
pub use events::{EventKind, LedgerEvent};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Internal API key not configured")]
    MissingApiKey,

    #[error("Invalid ledger URL: {0}")]
    InvalidUrl(String),

    #[error("Ledger request failed: {0}")]
    Http(String),

    #[error("Ledger request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Ledger returned {status}: {body}")]
    Status { status: u16, body: String },
}

pub type NotifyResult<T> = Result<T, NotifyError>;
