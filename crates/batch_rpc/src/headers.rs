use std::collections::BTreeMap;

use credential_store::Credentials;

use crate::config::BatchRpcConfig;
use crate::url::normalize_base_url;

pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_COOKIE: &str = "cookie";
pub const HEADER_ORIGIN: &str = "origin";
pub const HEADER_REFERER: &str = "referer";
pub const HEADER_SAME_DOMAIN: &str = "x-same-domain";
pub const HEADER_USER_AGENT: &str = "user-agent";

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;charset=UTF-8";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Build a deterministic header map for one gateway request.
pub fn build_headers(
    config: &BatchRpcConfig,
    credentials: &Credentials,
) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    let origin = normalize_base_url(&config.base_url);

    headers.insert(
        HEADER_CONTENT_TYPE.to_owned(),
        FORM_CONTENT_TYPE.to_owned(),
    );
    headers.insert(HEADER_COOKIE.to_owned(), credentials.cookie_header());
    headers.insert(HEADER_REFERER.to_owned(), format!("{origin}/"));
    headers.insert(HEADER_ORIGIN.to_owned(), origin);
    headers.insert(HEADER_SAME_DOMAIN.to_owned(), "1".to_owned());

    let user_agent = config
        .user_agent
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_USER_AGENT);
    headers.insert(HEADER_USER_AGENT.to_owned(), user_agent.to_owned());

    for (key, value) in &config.extra_headers {
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    headers
}
