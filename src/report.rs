//! Structured, user-visible failure reports.

use batch_rpc::BatchRpcError;
use serde::{Deserialize, Serialize};
use session_auth::AuthError;

use crate::bridge::{auth_suggestion, BridgeError};

/// What a caller sees when an operation fails: a stable code, a message,
/// whether resubmitting may help, and what to do about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: String,
    pub message: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ErrorReport {
    fn new(code: &str, message: String, retryable: bool, suggestion: Option<&str>) -> Self {
        Self {
            code: code.to_owned(),
            message,
            retryable,
            suggestion: suggestion.map(str::to_owned),
        }
    }

    /// Wraps a failure that happened outside the client, such as bad CLI input.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(
            "validation_error",
            message.into(),
            false,
            Some("Fix the request parameters and resubmit."),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message.into(), false, None)
    }
}

impl From<&BatchRpcError> for ErrorReport {
    fn from(error: &BatchRpcError) -> Self {
        Self::new(
            error.code(),
            error.to_string(),
            error.is_retryable(),
            error.suggestion(),
        )
    }
}

impl From<&AuthError> for ErrorReport {
    fn from(error: &AuthError) -> Self {
        Self::new(error.code(), error.to_string(), false, auth_suggestion(error))
    }
}

impl From<&BridgeError> for ErrorReport {
    fn from(error: &BridgeError) -> Self {
        Self::new(
            error.code(),
            error.to_string(),
            error.is_retryable(),
            error.suggestion(),
        )
    }
}

impl From<BridgeError> for ErrorReport {
    fn from(error: BridgeError) -> Self {
        Self::from(&error)
    }
}
