//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! .env + custody.toml
//!     → loader.rs (parse, environment overrides)
//!     → validation.rs (semantic checks)
//!     → CustodyConfig (validated, immutable)
//!     → policy.rs (lookup tables used by the engine)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Secrets prefer the environment and never print

pub mod loader;
pub mod policy;
pub mod schema;
pub mod secret;
pub mod validation;

pub use policy::CustodyPolicy;
pub use schema::{
    AdminConfig, AssetConfig, CustodyConfig, DelegationConfig, EngineConfig, LedgerConfig,
    NetworkConfig, ObservabilityConfig, PriceConfig, SweepConfig,
};
pub use secret::SecretString;
