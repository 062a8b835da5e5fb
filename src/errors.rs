// src/errors.rs
//
// Error taxonomy for the resolver. Transport-level failures are retried by the
// fetcher and only surface here once the retry budget is gone.

use crate::fetcher::CallKind;
use crate::transport::TransportError;
use log::error;

/// Errors surfaced by the pricing path resolver.
///
/// Soft outcomes are not errors: a token without pairs yields an empty route list and a
/// token page without a price yields [`crate::types::TokenPrice::none`].
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    /// The network identifier is not part of the registry table.
    #[error("Unknown network: {0}")]
    UnknownNetwork(String),

    /// An external call kept failing until the retry budget was exhausted.
    #[error("{kind} call to {target} failed after {attempts} attempts: {source}")]
    FetchFailed {
        kind: CallKind,
        target: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// The payload arrived but does not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Caller supplied a malformed address or block tag.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Settings or the network table failed validation.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ResolverError {
    /// Builds an `InvalidResponse`, logging it first.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        let message = message.into();
        error!("❌ Invalid response: {}", message);
        ResolverError::InvalidResponse(message)
    }
}

pub type Result<T> = std::result::Result<T, ResolverError>;
