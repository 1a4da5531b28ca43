use reqwest::StatusCode;
use thiserror::Error;

use crate::codec::{DecodeError, ANTI_XSSI_PREFIX};

/// Longest slice of an error body carried into a message.
const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchRpcError {
    #[error("authentication expired: {message}")]
    AuthExpired { message: String },

    #[error("access forbidden: {message}")]
    AuthInvalid { message: String },

    #[error("rate limited: {message}")]
    RateLimited { message: String },

    #[error("server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("network error: {message}")]
    Network { message: String },

    #[error("call {rpc_id} failed with error codes {codes:?}")]
    Rpc { rpc_id: String, codes: Vec<i64> },

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),
}

impl BatchRpcError {
    pub fn auth_expired(message: impl Into<String>) -> Self {
        Self::AuthExpired {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthExpired { .. } => "auth_expired",
            Self::AuthInvalid { .. } => "auth_invalid",
            Self::RateLimited { .. } => "rate_limited",
            Self::ServerError { .. } => "server_error",
            Self::Network { .. } => "network_error",
            Self::Rpc { .. } => "rpc_error",
            Self::Validation(_) => "validation_error",
            Self::Status { .. } => "http_error",
            Self::InvalidConfig(_) => "invalid_config",
        }
    }

    /// Whether resubmitting later may succeed without new credentials.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::ServerError { .. } | Self::Network { .. }
        )
    }

    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::AuthExpired { .. } => Some(
                "Run `notebook-bridge login` with a fresh Cookie header copied from a signed-in browser.",
            ),
            Self::AuthInvalid { .. } => Some(
                "The account was refused access; sign in with an account that can open the notebook and run `notebook-bridge login` again.",
            ),
            Self::RateLimited { .. } => Some("Wait a minute before resubmitting."),
            Self::ServerError { .. } => Some("The service is failing; retry shortly."),
            Self::Network { .. } => Some("Check network connectivity and retry."),
            Self::Rpc { .. } => Some("The service rejected this call; check the call parameters."),
            Self::Validation(_) => Some("Fix the request parameters and resubmit."),
            Self::Status { .. } => None,
            Self::InvalidConfig(_) => Some("Check the NOTEBOOK_BRIDGE_* settings."),
        }
    }
}

impl From<DecodeError> for BatchRpcError {
    fn from(error: DecodeError) -> Self {
        match error {
            DecodeError::AuthExpired => Self::auth_expired(error.to_string()),
        }
    }
}

/// Short human-readable message for a failed response.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    let body = body.trim_start();
    let body = body.strip_prefix(ANTI_XSSI_PREFIX).unwrap_or(body).trim();

    if body.is_empty() || body.starts_with('<') {
        return status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_owned();
    }

    let mut message: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    if body.chars().count() > MAX_ERROR_BODY_CHARS {
        message.push_str("...");
    }
    message
}
