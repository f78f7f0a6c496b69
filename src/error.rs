//! Error types and failure classification
//!
//! Configuration faults are fatal and surface as [`ConfigError`]. Per-chain
//! runtime faults stay inside the reconciliation report and are tagged with a
//! [`FailureKind`] so operators can tell a flaky RPC from a reverted update.

use serde::Serialize;
use thiserror::Error;

/// Fatal configuration problems detected before any chain is touched
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    MissingEnv(&'static str),

    #[error("invalid value for {name}: {reason}")]
    InvalidEnv { name: &'static str, reason: String },

    #[error("desired config has no target entry for chain {chain_id}")]
    MissingTarget { chain_id: u16 },

    #[error("supported key position {position} is outside the 256-bit bitmap")]
    KeyOutOfRange { position: u64 },

    #[error("duplicate chain id {chain_id} in chain registry")]
    DuplicateChain { chain_id: u16 },

    #[error("chain {chain_id} is not in the chain registry")]
    UnknownChain { chain_id: u16 },

    #[error("no {contract} address configured for chain {chain_id}")]
    MissingContract {
        contract: &'static str,
        chain_id: u16,
    },

    #[error("{name} must be a valid http(s) URL: {reason}")]
    InvalidUrl { name: String, reason: String },

    #[error("{field} for target chain {chain_id} does not fit uint128")]
    ValueOutOfRange { field: &'static str, chain_id: u16 },
}

/// Classifies a per-chain failure for the end-of-run report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// RPC timeout, connection refused, rate limiting
    Transient,
    /// Transaction included but reverted, or the call reverted
    Reverted,
    /// Anything else (bad encoding, unexpected response)
    Unknown,
}

/// Classify an error message
pub fn classify_error(error: &str) -> FailureKind {
    let error_lower = error.to_lowercase();

    if error_lower.contains("revert") {
        return FailureKind::Reverted;
    }

    if error_lower.contains("timeout")
        || error_lower.contains("timed out")
        || error_lower.contains("connection")
        || error_lower.contains("network")
        || error_lower.contains("rate limit")
        || error_lower.contains("too many requests")
        || error_lower.contains("503")
        || error_lower.contains("502")
        || error_lower.contains("temporarily unavailable")
    {
        return FailureKind::Transient;
    }

    FailureKind::Unknown
}
