//! Environment configuration.

use std::env;
use std::path::{Path, PathBuf};

use batch_rpc::BatchRpcConfig;
use credential_store::{auth_file, conversations_file, data_root, DATA_DIR_NAME};
use session_auth::AuthConfig;

pub const ENV_DATA_DIR: &str = "NOTEBOOK_BRIDGE_DATA_DIR";
pub const ENV_BASE_URL: &str = "NOTEBOOK_BRIDGE_BASE_URL";
pub const ENV_BUILD_LABEL: &str = "NOTEBOOK_BRIDGE_BUILD_LABEL";
pub const ENV_LOCALE: &str = "NOTEBOOK_BRIDGE_LOCALE";
pub const ENV_USER_AGENT: &str = "NOTEBOOK_BRIDGE_USER_AGENT";
/// Command line of the browser credential helper.
pub const ENV_BROWSER_HELPER: &str = "NOTEBOOK_BRIDGE_BROWSER_HELPER";
pub const ENV_BROWSER_REFRESH: &str = "NOTEBOOK_BRIDGE_BROWSER_REFRESH";
pub const ENV_LOG: &str = "NOTEBOOK_BRIDGE_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Holds the credential and conversation files.
    pub data_dir: PathBuf,
    pub base_url: Option<String>,
    pub build_label: Option<String>,
    pub locale: Option<String>,
    pub user_agent: Option<String>,
    pub browser_helper: Option<String>,
    /// Browser-assisted recovery; enabled unless switched off.
    pub browser_refresh: bool,
    /// `tracing` filter directives.
    pub log_filter: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            base_url: None,
            build_label: None,
            locale: None,
            user_agent: None,
            browser_helper: None,
            browser_refresh: true,
            log_filter: None,
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads every setting through `lookup`; unset or blank values keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).and_then(non_empty);
        Self {
            data_dir: value(ENV_DATA_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(default_data_dir),
            base_url: value(ENV_BASE_URL),
            build_label: value(ENV_BUILD_LABEL),
            locale: value(ENV_LOCALE),
            user_agent: value(ENV_USER_AGENT),
            browser_helper: value(ENV_BROWSER_HELPER),
            browser_refresh: parse_flag(value(ENV_BROWSER_REFRESH).as_deref(), true),
            log_filter: value(ENV_LOG),
        }
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn auth_file(&self) -> PathBuf {
        auth_file(&self.data_dir)
    }

    pub fn conversations_file(&self) -> PathBuf {
        conversations_file(&self.data_dir)
    }

    pub fn rpc_config(&self) -> BatchRpcConfig {
        let mut config = BatchRpcConfig::default();
        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url);
        }
        if let Some(build_label) = &self.build_label {
            config = config.with_build_label(build_label);
        }
        if let Some(locale) = &self.locale {
            config = config.with_locale(locale);
        }
        if let Some(user_agent) = &self.user_agent {
            config = config.with_user_agent(user_agent);
        }
        config
    }

    /// The landing page is the root of the configured service origin.
    pub fn auth_config(&self) -> AuthConfig {
        let mut config = AuthConfig::default().with_browser_refresh(self.browser_refresh);
        if let Some(base_url) = &self.base_url {
            let origin = batch_rpc::normalize_base_url(base_url);
            config = config.with_landing_url(format!("{origin}/"));
        }
        if let Some(user_agent) = &self.user_agent {
            config = config.with_user_agent(user_agent);
        }
        config
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| data_root(&home))
        .unwrap_or_else(|| Path::new(DATA_DIR_NAME).to_path_buf())
}

fn parse_flag(value: Option<&str>, default: bool) -> bool {
    match value.map(str::to_ascii_lowercase).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.trim().to_owned())
    }
}
