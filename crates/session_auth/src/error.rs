use credential_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("cookie header is missing required session cookies: {}", missing.join(", "))]
    MissingCookies { missing: Vec<String> },

    #[error("credential recovery exhausted every layer; supply fresh cookies")]
    RecoveryExhausted,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

impl AuthError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCookies { .. } => "missing_cookies",
            Self::RecoveryExhausted => "auth_expired",
            Self::Store(_) => "storage_error",
            Self::HttpClient(_) => "internal_error",
        }
    }
}
