//! Denial and oracle error types for the gating pipeline.
//!
//! Policy refusals are decision values carried on reports, not `Err` returns.
//! Operational failures are fail-closed: a dependency that cannot answer
//! denies, it never allows.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a command or transaction was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenialReason {
    #[error("Rate limit exceeded, retry in {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Duplicate command rejected")]
    ReplayDetected,

    #[error("Invalid transaction amount: {detail}")]
    InvalidAmount { detail: String },

    #[error("Invalid recipient: {detail}")]
    InvalidRecipient { detail: String },

    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance {
        available: Decimal,
        required: Decimal,
    },

    #[error("Insufficient balance for amount and fees: available {available}, required {required}")]
    InsufficientBalanceForFees {
        available: Decimal,
        required: Decimal,
    },

    #[error("Fee estimate unavailable")]
    FeeEstimateUnavailable,

    #[error("Oracle unavailable: {detail}")]
    OracleUnavailable { detail: String },
}

impl DenialReason {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::ReplayDetected => "replay_detected",
            Self::InvalidAmount { .. } => "invalid_amount",
            Self::InvalidRecipient { .. } => "invalid_recipient",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::InsufficientBalanceForFees { .. } => "insufficient_balance_for_fees",
            Self::FeeEstimateUnavailable => "fee_estimate_unavailable",
            Self::OracleUnavailable { .. } => "oracle_unavailable",
        }
    }

    /// Returns true if this denial points at abuse rather than caller error.
    pub fn is_security_concern(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::ReplayDetected)
    }
}

/// Soft findings that accompany an otherwise valid transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationWarning {
    /// Fee could not be estimated; the transaction may still clear.
    FeeEstimateUnavailable,
}

impl ValidationWarning {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FeeEstimateUnavailable => "fee_estimate_unavailable",
        }
    }
}

/// Errors surfaced by balance and fee oracles.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),

    #[error("Oracle timed out after {0}ms")]
    Timeout(u64),
}
