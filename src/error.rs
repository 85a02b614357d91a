//! Error taxonomy for the sentinel pipeline
//!
//! Every rejection a caller can observe maps to one variant here. Transient
//! per-source fetch problems never surface as errors; they are absorbed at
//! the source boundary and only become an error when a cycle is left without
//! usable data (`NoSourcesAvailable`, `MissingAssetData`).

use thiserror::Error;

use crate::types::Asset;

#[derive(Debug, Error)]
pub enum SentinelError {
    /// Every configured price source failed or timed out this cycle.
    #[error("no price sources available")]
    NoSourcesAvailable,

    /// Sources reported, but none of them priced this asset.
    #[error("no {asset} price from any source")]
    MissingAssetData { asset: Asset },

    /// The state store refused a write inside the minimum update interval.
    #[error("update too frequent, retry in {retry_in_secs}s")]
    RateLimited { retry_in_secs: u64 },

    /// Caller is neither the store owner nor on the authorized list.
    #[error("caller is not authorized: {caller}")]
    Unauthorized { caller: String },

    /// A write or admin argument failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("threshold must be 0-100, got {0}")]
    InvalidThreshold(u8),

    /// Unknown or already-evicted request id.
    #[error("request not found: {0}")]
    RequestNotFound(String),

    #[error("duplicate request id: {0}")]
    DuplicateRequest(String),

    /// A second terminal transition was attempted on the same request.
    #[error("request already fulfilled: {0}")]
    AlreadyFulfilled(String),
}
