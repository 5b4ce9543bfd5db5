//! Key management subsystem.
//!
//! # Data Flow
//! ```text
//! CUSTODY_MASTER_SEED (environment, once at startup)
//!     → derivation.rs (KeyDerivationService, held by reference)
//!     → address.rs    (TRON Base58Check / EVM EIP-55 encoding)
//!     → signing.rs    (per-operation SigningMaterial, dropped after use)
//!
//! allocator.rs issues derivation indices; provision.rs ties an index to
//! a merchant and registers the resulting address.
//! ```
//!
//! # Security Constraints
//! - No private key is ever persisted, logged, or cached
//! - The seed never leaves the KeyDerivationService

pub mod address;
pub mod allocator;
pub mod derivation;
pub mod provision;
pub mod signing;

use thiserror::Error;

pub use allocator::{AtomicIndexAllocator, IndexAllocator};
pub use derivation::KeyDerivationService;
pub use provision::provision_address;
pub use signing::SigningMaterial;

/// Errors from key derivation and signing.
#[derive(Debug, Error)]
pub enum KeyError {
    /// Seed could not be parsed. Fatal at startup.
    #[error("Invalid master seed: {0}")]
    InvalidSeed(String),

    /// No seed configured; derivation is unavailable.
    #[error("Master seed not configured")]
    NotConfigured,

    #[error("Key derivation failed: {0}")]
    Derivation(String),

    #[error("Derivation index {0} out of range")]
    IndexOutOfRange(u64),

    #[error("Signing failed: {0}")]
    Signing(String),
}

/// Result type for key operations.
pub type KeyResult<T> = Result<T, KeyError>;
