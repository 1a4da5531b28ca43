use credential_store::Credentials;
use serde::Serialize;

/// Process-wide credential lifecycle. Exactly one variant is live at a time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CredentialState {
    /// No usable credentials are held.
    #[default]
    Unauthenticated,
    /// Credentials in use; `token_refreshed_at` is when the anti-forgery token was minted.
    Authenticated {
        credentials: Credentials,
        token_refreshed_at: i64,
    },
    /// Cookies are held but known to be rejected.
    Expired { credentials: Credentials },
}

impl CredentialState {
    pub fn kind(&self) -> StateKind {
        match self {
            Self::Unauthenticated => StateKind::Unauthenticated,
            Self::Authenticated { .. } => StateKind::Authenticated,
            Self::Expired { .. } => StateKind::Expired,
        }
    }

    /// Credentials held in any state, stale or not.
    pub fn held_credentials(&self) -> Option<&Credentials> {
        match self {
            Self::Unauthenticated => None,
            Self::Authenticated { credentials, .. } | Self::Expired { credentials } => {
                Some(credentials)
            }
        }
    }

    /// State after every recovery layer failed.
    pub(crate) fn exhausted(&self) -> Self {
        match self.held_credentials() {
            Some(credentials) => Self::Expired {
                credentials: credentials.clone(),
            },
            None => Self::Unauthenticated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    Unauthenticated,
    Authenticated,
    Expired,
}

impl StateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticated => "authenticated",
            Self::Expired => "expired",
        }
    }
}

/// Secret-free summary of the current credential state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthStatus {
    pub state: StateKind,
    pub cookies_valid: bool,
    pub cookie_count: usize,
    pub has_csrf_token: bool,
    pub has_session_id: bool,
    pub token_age_secs: Option<i64>,
    pub credential_age_secs: Option<i64>,
}

impl AuthStatus {
    pub(crate) fn from_state(state: &CredentialState, now: i64) -> Self {
        let credentials = state.held_credentials();
        let token_age_secs = match state {
            CredentialState::Authenticated {
                token_refreshed_at, ..
            } => Some(now.saturating_sub(*token_refreshed_at).max(0)),
            _ => None,
        };

        Self {
            state: state.kind(),
            cookies_valid: credentials.is_some_and(Credentials::has_required_cookies),
            cookie_count: credentials.map_or(0, |credentials| credentials.cookies.len()),
            has_csrf_token: credentials.is_some_and(|credentials| credentials.csrf_token().is_some()),
            has_session_id: credentials.is_some_and(|credentials| credentials.session_id().is_some()),
            token_age_secs,
            credential_age_secs: credentials.map(|credentials| credentials.age_secs(now)),
        }
    }
}
