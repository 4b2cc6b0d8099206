//! Error types for the analysis engine.
//!
//! This module provides structured error handling with:
//! - `AnalysisError`: run-level failures surfaced by `run_analysis`
//! - `Result<T>`: Type alias for Results using AnalysisError
//!
//! Per-item collaborator failures never show up here: they are logged,
//! recorded on the report and the item is dropped from its phase.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// DOMAIN ERROR TYPE
// ============================================================================

/// Fatal failures of a single analysis run.
///
/// The type is `Clone` because one outcome is shared by the caller that
/// started a run and every caller that joined it while it was in flight.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalysisError {
    /// Request rejected before any work was scheduled
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The quota gate refused to admit the run
    #[error("Quota exceeded: {reason} (resets {reset_date})")]
    QuotaExceeded {
        reason: String,
        reset_date: DateTime<Utc>,
    },

    /// The quota collaborator could not be consulted
    #[error("Quota service unavailable: {0}")]
    QuotaUnavailable(String),

    /// Phase outputs could not be combined into a report
    #[error("Aggregation failed: {0}")]
    Aggregation(String),

    /// The whole-run timeout elapsed
    #[error("Analysis timed out after {0}ms")]
    Timeout(u128),

    /// The run panicked or was cancelled by the runtime
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnalysisError {
    /// Create an invalid request error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a quota exceeded error
    pub fn quota_exceeded(reason: impl Into<String>, reset_date: DateTime<Utc>) -> Self {
        Self::QuotaExceeded {
            reason: reason.into(),
            reset_date,
        }
    }

    /// Create an aggregation error
    pub fn aggregation(msg: impl Into<String>) -> Self {
        Self::Aggregation(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether a cached result may stand in for this failure.
    ///
    /// Admission decisions are final: a rejected request or an exhausted
    /// quota never falls back to a cached report.
    pub fn allows_cache_fallback(&self) -> bool {
        !matches!(
            self,
            Self::InvalidRequest(_) | Self::QuotaExceeded { .. }
        )
    }
}

/// Result type alias using AnalysisError.
pub type Result<T> = std::result::Result<T, AnalysisError>;

// ============================================================================
// WIRE FORMAT
// ============================================================================

/// Errors cross the API boundary as their human-readable message.
impl Serialize for AnalysisError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<tokio::task::JoinError> for AnalysisError {
    fn from(error: tokio::task::JoinError) -> Self {
        if error.is_panic() {
            Self::internal("analysis task panicked")
        } else {
            Self::internal("analysis task was cancelled")
        }
    }
}
