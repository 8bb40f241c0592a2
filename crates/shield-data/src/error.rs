//! Error taxonomy shared by every rescue component.
//!
//! Detector and scanner failures are absorbed into conservative defaults and
//! only surface as [`ShieldError::DegradedData`] in logs. Executor and bundle
//! failures are embedded in their terminal result values instead of being
//! returned as `Err`.

use alloy::primitives::{B256, U256};
use serde::Serialize;
use thiserror::Error;

/// Failure classes for rescue operations.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ShieldError {
    /// Malformed or missing builder input. Never retried.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Computed send value is zero or negative after gas.
    #[error("insufficient funds: need more than {required} wei, have {available} wei")]
    InsufficientFunds {
        /// Gas budget (wei) that must be exceeded.
        required: U256,
        /// Balance (wei) available to the sender.
        available: U256,
    },

    /// RPC or relay call failed, timed out, or exhausted its retries.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Transaction was mined but failed on-chain.
    #[error("transaction {tx_hash} reverted")]
    Reverted {
        /// Hash of the reverted transaction.
        tx_hash: B256,
    },

    /// Bundle was not included in any candidate block.
    #[error("bundle not included after {candidates} candidate blocks")]
    NotIncluded {
        /// Number of candidate blocks tried.
        candidates: u64,
    },

    /// History source or log scan failed; callers continue with partial data.
    #[error("degraded data: {0}")]
    DegradedData(String),

    /// Local signing failed.
    #[error("signing failed: {0}")]
    Signing(String),
}

impl ShieldError {
    /// Wraps any displayable transport error.
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    /// Returns true when retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
