use std::collections::BTreeMap;
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::url::{
    DEFAULT_BASE_URL, DEFAULT_BUILD_LABEL, DEFAULT_GATEWAY_PATH, DEFAULT_LOCALE,
    DEFAULT_STREAM_PATH,
};

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(120);

/// Transport configuration for gateway requests.
#[derive(Debug, Clone)]
pub struct BatchRpcConfig {
    /// Service origin; `Origin` and `Referer` are derived from it.
    pub base_url: String,
    pub gateway_path: String,
    pub stream_path: String,
    /// Backend build label sent as `bl`.
    pub build_label: String,
    /// Locale sent as `hl`.
    pub locale: String,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Timeout for a batched call when the call does not set one.
    pub timeout: Duration,
    /// Timeout for a streamed query, body included.
    pub stream_timeout: Duration,
    pub retry: RetryPolicy,
    /// Additional headers merged into request headers.
    pub extra_headers: BTreeMap<String, String>,
}

impl Default for BatchRpcConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            gateway_path: DEFAULT_GATEWAY_PATH.to_owned(),
            stream_path: DEFAULT_STREAM_PATH.to_owned(),
            build_label: DEFAULT_BUILD_LABEL.to_owned(),
            locale: DEFAULT_LOCALE.to_owned(),
            user_agent: None,
            timeout: DEFAULT_CALL_TIMEOUT,
            stream_timeout: DEFAULT_STREAM_TIMEOUT,
            retry: RetryPolicy::default(),
            extra_headers: BTreeMap::new(),
        }
    }
}

impl BatchRpcConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_gateway_path(mut self, path: impl Into<String>) -> Self {
        self.gateway_path = path.into();
        self
    }

    pub fn with_stream_path(mut self, path: impl Into<String>) -> Self {
        self.stream_path = path.into();
        self
    }

    pub fn with_build_label(mut self, build_label: impl Into<String>) -> Self {
        self.build_label = build_label.into();
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.extra_headers.extend(headers);
        self
    }
}
