// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The error taxonomy. Every crate boundary in the workspace eventually
//! converts its own error enum into one of these variants via
//! `#[from]`, so the wire `Response::Error` carries a stable
//! `{kind, message}` shape regardless of which layer failed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The stable error taxonomy exposed across RPC boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum NoetlError {
    #[error("input validation failed: {0}")]
    InputValidationError(String),

    #[error("tool execution failed: {0}")]
    ToolExecutionError(String),

    #[error("task timed out")]
    TaskTimeout,

    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("result store unavailable: {0}")]
    ResultStoreUnavailable(String),

    #[error("credential failure: {0}")]
    CredentialFailure(String),

    #[error("credential schema mismatch: {0}")]
    CredentialSchemaError(String),

    #[error("lease conflict for execution {execution_id}")]
    LeaseConflict { execution_id: String },

    #[error("unsupported tool kind: {0}")]
    UnsupportedTool(String),
}

impl NoetlError {
    /// A short, stable discriminant string — the `kind` half of the
    /// `{kind, message}` shape a failed execution's terminal event
    /// carries.
    pub fn kind(&self) -> &'static str {
        match self {
            NoetlError::InputValidationError(_) => "InputValidationError",
            NoetlError::ToolExecutionError(_) => "ToolExecutionError",
            NoetlError::TaskTimeout => "TaskTimeout",
            NoetlError::BrokerUnavailable(_) => "BrokerUnavailable",
            NoetlError::ResultStoreUnavailable(_) => "ResultStoreUnavailable",
            NoetlError::CredentialFailure(_) => "CredentialFailure",
            NoetlError::CredentialSchemaError(_) => "CredentialSchemaError",
            NoetlError::LeaseConflict { .. } => "LeaseConflict",
            NoetlError::UnsupportedTool(_) => "UnsupportedTool",
        }
    }

    /// Whether the engine's default retry policy should ever consider
    /// retrying this error kind at all — credential and unsupported-tool
    /// errors are non-retriable by default.
    pub fn is_retriable_by_default(&self) -> bool {
        matches!(
            self,
            NoetlError::ToolExecutionError(_)
                | NoetlError::TaskTimeout
                | NoetlError::BrokerUnavailable(_)
                | NoetlError::ResultStoreUnavailable(_)
        )
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
