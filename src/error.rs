//! Top-level error type for engine operations that cross subsystems.

use thiserror::Error;

use crate::chain::types::{ChainError, Network};
use crate::keys::KeyError;
use crate::notify::NotifyError;
use crate::store::StoreError;
use crate::sweep::delegation::DelegationError;

#[derive(Debug, Error)]
pub enum CustodyError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error(transparent)]
    Delegation(#[from] DelegationError),

    #[error("No chain adapter configured for {0}")]
    NoAdapter(Network),

    #[error("Asset {asset} is not configured on {network}")]
    UnknownAsset { network: Network, asset: String },

    #[error("No hot wallet configured for {0}")]
    NoHotWallet(Network),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

pub type CustodyResult<T> = Result<T, CustodyError>;
