//! Engine orchestration.
//!
//! # Data Flow
//! ```text
//! PollLoop (single worker)
//!     → PriceUpdater::refresh_if_stale
//!     → WalletMonitor::scan        (detection + confirmation)
//!     → SweepProcessor::run        (consolidation)
//!     → ReclaimQueue::process_due  (delegation reclaim)
//!     → MemoryStore::save_to_file  (checkpoint)
//!     → wait max(interval - elapsed, min_wait), interruptible by shutdown
//! ```

pub mod poll_loop;

pub use poll_loop::{next_wait, CycleSummary, EngineStats, PollLoop};
