use std::sync::OnceLock;

use regex::Regex;
use reqwest::Url;

/// Embedded-JSON key carrying the anti-forgery token.
pub const CSRF_TOKEN_MARKER: &str = "SNlM0e";
/// Embedded-JSON key carrying the session correlation id.
pub const SESSION_ID_MARKER: &str = "FdrFJe";

fn csrf_token_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r#""SNlM0e"\s*:\s*"([^"]+)""#).expect("csrf token regex must compile")
    })
}

fn session_id_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r#""FdrFJe"\s*:\s*"([^"]+)""#).expect("session id regex must compile")
    })
}

/// Tokens scanned out of one landing page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageTokens {
    pub csrf_token: Option<String>,
    pub session_id: Option<String>,
}

pub fn extract_page_tokens(html: &str) -> PageTokens {
    PageTokens {
        csrf_token: extract_csrf_token(html),
        session_id: extract_session_id(html),
    }
}

pub fn extract_csrf_token(html: &str) -> Option<String> {
    capture(csrf_token_regex(), html)
}

pub fn extract_session_id(html: &str) -> Option<String> {
    capture(session_id_regex(), html)
}

/// True when a landing fetch ended on a login host instead of the service.
pub fn is_login_redirect(url: &Url, login_hosts: &[String]) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    login_hosts.iter().any(|login| {
        let login = login.trim();
        !login.is_empty()
            && (host.eq_ignore_ascii_case(login)
                || host
                    .to_ascii_lowercase()
                    .ends_with(&format!(".{}", login.to_ascii_lowercase())))
    })
}

fn capture(regex: &Regex, html: &str) -> Option<String> {
    regex
        .captures(html)
        .and_then(|captures| captures.get(1))
        .map(|value| value.as_str().trim().to_owned())
        .filter(|value| !value.is_empty())
}
