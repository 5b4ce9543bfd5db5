//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events with network/address/tx_hash fields)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON lines in production)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Constraints
//! - Every event about a deposit carries `tx_hash`; sweep events carry the
//!   sweep hash as well
//! - Seeds, private keys and API keys never reach a log line or a label
//! - Metric labels are bounded: network, asset, outcome, event kind

pub mod logging;
pub mod metrics;
