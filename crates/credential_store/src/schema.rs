use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Session-identity cookies that must all be present for a cookie set to be usable.
pub const REQUIRED_COOKIES: [&str; 5] = ["SID", "HSID", "SSID", "APISID", "SAPISID"];

/// Browser session credentials: cookies plus the two page-embedded tokens.
///
/// Serialized as the persisted credential file:
/// `{"cookies": {..}, "csrf_token": "..", "session_id": "..", "extracted_at": 1700000000}`.
/// The camelCase names used by browser helpers are accepted on input.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
    /// Anti-forgery token sent as the `at` form field.
    #[serde(default, alias = "csrfToken")]
    pub csrf_token: Option<String>,
    /// Session correlation id sent as the `f.sid` query parameter.
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
    /// Seconds since the Unix epoch when cookies or tokens were last extracted.
    #[serde(default, alias = "extractedAt")]
    pub extracted_at: i64,
}

impl Credentials {
    #[must_use]
    pub fn new(cookies: BTreeMap<String, String>) -> Self {
        Self {
            cookies,
            csrf_token: None,
            session_id: None,
            extracted_at: now_unix(),
        }
    }

    /// Builds credentials from a pasted `Cookie` header (with or without the `Cookie:` name).
    #[must_use]
    pub fn from_cookie_header(header: &str) -> Self {
        Self::new(parse_cookie_header(header))
    }

    #[must_use]
    pub fn with_csrf_token(mut self, token: impl Into<String>) -> Self {
        self.csrf_token = non_empty(token.into());
        self
    }

    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = non_empty(session_id.into());
        self
    }

    #[must_use]
    pub fn with_extracted_at(mut self, extracted_at: i64) -> Self {
        self.extracted_at = extracted_at;
        self
    }

    #[must_use]
    pub fn has_required_cookies(&self) -> bool {
        validate_cookies(&self.cookies)
    }

    #[must_use]
    pub fn missing_cookies(&self) -> Vec<&'static str> {
        REQUIRED_COOKIES
            .iter()
            .copied()
            .filter(|name| !has_cookie(&self.cookies, name))
            .collect()
    }

    pub fn csrf_token(&self) -> Option<&str> {
        self.csrf_token
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Serializes cookies back into a `Cookie` request header value.
    #[must_use]
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    #[must_use]
    pub fn age_secs(&self, now: i64) -> i64 {
        now.saturating_sub(self.extracted_at).max(0)
    }

    /// True once the extraction timestamp is older than `max_age`.
    #[must_use]
    pub fn is_older_than(&self, max_age: Duration, now: i64) -> bool {
        let max_age = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
        self.age_secs(now) > max_age
    }
}

/// One persisted question/answer exchange within a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub query: String,
    pub answer: String,
    #[serde(rename = "turnNumber", alias = "turn_number")]
    pub turn_number: u32,
}

/// Returns true when every name in [`REQUIRED_COOKIES`] maps to a non-empty value.
#[must_use]
pub fn validate_cookies(cookies: &BTreeMap<String, String>) -> bool {
    REQUIRED_COOKIES
        .iter()
        .all(|name| has_cookie(cookies, name))
}

/// Parses `name=value; name2=value2` pairs. Segments without `=` or with an empty
/// name are dropped; later duplicates win.
#[must_use]
pub fn parse_cookie_header(header: &str) -> BTreeMap<String, String> {
    let trimmed = header.trim();
    let body = match trimmed.split_once(':') {
        Some((name, rest)) if name.trim().eq_ignore_ascii_case("cookie") => rest,
        _ => trimmed,
    };

    body.split(';')
        .filter_map(|segment| segment.split_once('='))
        .map(|(name, value)| (name.trim(), value.trim()))
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, value)| (name.to_owned(), value.to_owned()))
        .collect()
}

#[must_use]
pub fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn has_cookie(cookies: &BTreeMap<String, String>, name: &str) -> bool {
    cookies
        .get(name)
        .is_some_and(|value| !value.trim().is_empty())
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}
