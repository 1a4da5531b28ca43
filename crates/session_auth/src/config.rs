use std::time::Duration;

/// Landing page fetched with session cookies to mint fresh page tokens.
pub const DEFAULT_LANDING_URL: &str = "https://notebooklm.google.com/";
/// Hosts that indicate the session cookies were rejected outright.
pub const DEFAULT_LOGIN_HOST: &str = "accounts.google.com";

pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(4 * 60 * 60);
pub const DEFAULT_PROACTIVE_WINDOW: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_MAX_CREDENTIAL_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const DEFAULT_LANDING_TIMEOUT: Duration = Duration::from_secs(15);

/// Credential lifecycle configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub landing_url: String,
    /// A landing fetch that ends on one of these hosts means the cookies are dead.
    pub login_hosts: Vec<String>,
    /// Expected validity of an anti-forgery token.
    pub token_lifetime: Duration,
    /// Tokens are refreshed opportunistically once within this window of `token_lifetime`.
    pub proactive_window: Duration,
    /// Persisted credentials older than this are not adopted.
    pub max_credential_age: Duration,
    /// Enables the browser-assisted recovery layer.
    pub browser_refresh: bool,
    pub landing_timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            landing_url: DEFAULT_LANDING_URL.to_owned(),
            login_hosts: vec![DEFAULT_LOGIN_HOST.to_owned()],
            token_lifetime: DEFAULT_TOKEN_LIFETIME,
            proactive_window: DEFAULT_PROACTIVE_WINDOW,
            max_credential_age: DEFAULT_MAX_CREDENTIAL_AGE,
            browser_refresh: true,
            landing_timeout: DEFAULT_LANDING_TIMEOUT,
            user_agent: None,
        }
    }
}

impl AuthConfig {
    pub fn with_landing_url(mut self, landing_url: impl Into<String>) -> Self {
        self.landing_url = landing_url.into();
        self
    }

    pub fn with_login_hosts(mut self, hosts: impl IntoIterator<Item = String>) -> Self {
        self.login_hosts = hosts.into_iter().collect();
        self
    }

    pub fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    pub fn with_proactive_window(mut self, window: Duration) -> Self {
        self.proactive_window = window;
        self
    }

    pub fn with_max_credential_age(mut self, max_age: Duration) -> Self {
        self.max_credential_age = max_age;
        self
    }

    pub fn with_browser_refresh(mut self, enabled: bool) -> Self {
        self.browser_refresh = enabled;
        self
    }

    pub fn with_landing_timeout(mut self, timeout: Duration) -> Self {
        self.landing_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Token age in seconds after which a proactive refresh is due.
    pub fn proactive_refresh_after_secs(&self) -> i64 {
        let due = self.token_lifetime.saturating_sub(self.proactive_window);
        i64::try_from(due.as_secs()).unwrap_or(i64::MAX)
    }
}
