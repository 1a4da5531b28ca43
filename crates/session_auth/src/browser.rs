use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use credential_store::Credentials;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::AuthConfig;

/// Environment variable handed to helper processes with the landing URL to open.
pub const HELPER_LANDING_URL_ENV: &str = "NOTEBOOK_BRIDGE_LANDING_URL";
pub const DEFAULT_HELPER_TIMEOUT: Duration = Duration::from_secs(180);

/// Source of a complete fresh credential set obtained by driving a real browser.
///
/// Failure is reported as `None`, never as an error.
#[async_trait]
pub trait BrowserRefresher: Send + Sync {
    async fn refresh_via_browser(&self, config: &AuthConfig) -> Option<Credentials>;
}

/// Runs a local helper program that drives the browser and prints one JSON
/// credential object (`cookies`, `csrfToken`, `sessionId`, `extractedAt`;
/// snake_case names also accepted) on stdout.
#[derive(Debug, Clone)]
pub struct HelperCommandRefresher {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl HelperCommandRefresher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_HELPER_TIMEOUT,
        }
    }

    /// Splits a whitespace-separated command line into program and arguments.
    pub fn from_command_line(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_owned);
        let program = parts.next()?;
        Some(Self::new(program).with_args(parts))
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl BrowserRefresher for HelperCommandRefresher {
    async fn refresh_via_browser(&self, config: &AuthConfig) -> Option<Credentials> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env(HELPER_LANDING_URL_ENV, &config.landing_url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(program = %self.program, "launching browser credential helper");
        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(error)) => {
                warn!(program = %self.program, %error, "browser credential helper failed to start");
                return None;
            }
            Err(_) => {
                warn!(
                    program = %self.program,
                    timeout_secs = self.timeout.as_secs(),
                    "browser credential helper timed out"
                );
                return None;
            }
        };

        if !output.status.success() {
            warn!(
                program = %self.program,
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "browser credential helper exited unsuccessfully"
            );
            return None;
        }

        parse_helper_output(&output.stdout)
    }
}

/// Parses helper stdout; `null`, empty output, or malformed JSON yield `None`.
pub fn parse_helper_output(stdout: &[u8]) -> Option<Credentials> {
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    match serde_json::from_str::<Option<Credentials>>(text) {
        Ok(credentials) => credentials,
        Err(error) => {
            warn!(%error, "browser credential helper printed malformed JSON");
            None
        }
    }
}
