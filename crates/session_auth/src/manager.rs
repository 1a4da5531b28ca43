use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use credential_store::{now_unix, CredentialStore, Credentials};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use reqwest::header::COOKIE;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::browser::BrowserRefresher;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::state::{AuthStatus, CredentialState, StateKind};
use crate::tokens::{extract_page_tokens, is_login_redirect};

type RefreshOutcome = Shared<BoxFuture<'static, bool>>;

/// The one recovery run currently in flight, tagged so only its own callers clear it.
struct InFlightRefresh {
    generation: u64,
    outcome: RefreshOutcome,
}

/// Owns the credential lifecycle and the single-flight layered recovery.
///
/// Clones share one state; construct one manager per process (or per test)
/// and hand clones to every transport.
#[derive(Clone)]
pub struct CredentialManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: AuthConfig,
    store: CredentialStore,
    browser: Option<Arc<dyn BrowserRefresher>>,
    http: Client,
    state: Mutex<CredentialState>,
    in_flight: Mutex<Option<InFlightRefresh>>,
    generation: AtomicU64,
    /// Serializes bootstrap loads and proactive token refreshes.
    token_gate: tokio::sync::Mutex<()>,
}

impl fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialManager")
            .field("state", &self.state().kind())
            .field("store", &self.inner.store.path())
            .field("browser", &self.inner.browser.is_some())
            .finish_non_exhaustive()
    }
}

impl CredentialManager {
    pub fn new(
        config: AuthConfig,
        store: CredentialStore,
        browser: Option<Arc<dyn BrowserRefresher>>,
    ) -> Result<Self, AuthError> {
        let mut builder = Client::builder().timeout(config.landing_timeout);
        if let Some(user_agent) = config.user_agent.as_deref() {
            builder = builder.user_agent(user_agent);
        }
        let http = builder.build().map_err(AuthError::HttpClient)?;

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                store,
                browser,
                http,
                state: Mutex::new(CredentialState::Unauthenticated),
                in_flight: Mutex::new(None),
                generation: AtomicU64::new(0),
                token_gate: tokio::sync::Mutex::new(()),
            }),
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    pub fn state(&self) -> CredentialState {
        lock_unpoisoned(&self.inner.state).clone()
    }

    pub fn status(&self) -> AuthStatus {
        AuthStatus::from_state(&lock_unpoisoned(&self.inner.state), now_unix())
    }

    /// Credentials to send with the next call; only available while authenticated.
    pub fn credentials(&self) -> Option<Credentials> {
        match &*lock_unpoisoned(&self.inner.state) {
            CredentialState::Authenticated { credentials, .. } => Some(credentials.clone()),
            _ => None,
        }
    }

    /// Makes sure usable credentials are loaded before a burst of calls.
    ///
    /// Returns `true` when calls may proceed. Near the end of the token
    /// lifetime a proactive token refresh is started on a background task; it
    /// is best-effort and never delays or changes the result.
    pub async fn ensure_valid(&self) -> bool {
        match self.state() {
            CredentialState::Authenticated {
                credentials,
                token_refreshed_at,
            } => {
                if credentials.csrf_token().is_none() {
                    debug!("authenticated without an anti-forgery token; refreshing before use");
                    return self.refresh().await;
                }
                if self.token_refresh_due(token_refreshed_at) {
                    let manager = self.clone();
                    tokio::spawn(async move { manager.refresh_proactively(&credentials).await });
                }
                true
            }
            CredentialState::Expired { .. } => self.refresh().await,
            CredentialState::Unauthenticated => self.bootstrap().await,
        }
    }

    /// [`Self::ensure_valid`] as a `Result` for callers that propagate errors.
    pub async fn require_valid(&self) -> Result<(), AuthError> {
        if self.ensure_valid().await {
            Ok(())
        } else {
            Err(AuthError::RecoveryExhausted)
        }
    }

    /// Runs layered recovery, collapsing concurrent callers onto one run.
    ///
    /// Every caller that arrives while a run is in flight awaits that same run
    /// and observes its outcome.
    pub async fn refresh(&self) -> bool {
        let (generation, outcome) = {
            let mut slot = lock_unpoisoned(&self.inner.in_flight);
            match slot.as_ref() {
                Some(flight) => {
                    debug!(generation = flight.generation, "joining in-flight credential recovery");
                    (flight.generation, flight.outcome.clone())
                }
                None => {
                    let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
                    let manager = self.clone();
                    let outcome = async move { manager.run_recovery().await }
                        .boxed()
                        .shared();
                    *slot = Some(InFlightRefresh {
                        generation,
                        outcome: outcome.clone(),
                    });
                    (generation, outcome)
                }
            }
        };

        let recovered = outcome.await;

        let mut slot = lock_unpoisoned(&self.inner.in_flight);
        if slot
            .as_ref()
            .is_some_and(|flight| flight.generation == generation)
        {
            *slot = None;
        }
        recovered
    }

    /// Manual credential entry: validates the cookie set, mints a token when none
    /// was supplied, persists, and authenticates.
    pub async fn adopt_manual(&self, credentials: Credentials) -> Result<AuthStatus, AuthError> {
        let missing = credentials.missing_cookies();
        if !missing.is_empty() {
            return Err(AuthError::MissingCookies {
                missing: missing.into_iter().map(str::to_owned).collect(),
            });
        }

        let credentials = if credentials.csrf_token().is_some() {
            credentials
        } else {
            match self.refresh_tokens(&credentials).await {
                Some(refreshed) => refreshed,
                None => {
                    warn!("could not mint a token for the supplied cookies; will retry before first call");
                    credentials
                }
            }
        };

        self.inner.store.save(&credentials)?;
        let token_refreshed_at = credentials.extracted_at;
        self.set_state(CredentialState::Authenticated {
            credentials,
            token_refreshed_at,
        });
        info!("adopted manually supplied credentials");
        Ok(self.status())
    }

    /// What bootstrap would adopt from the credential file, read without any
    /// network access. `None` when the file is missing, unreadable, incomplete
    /// or too old.
    pub fn persisted_status(&self) -> Option<AuthStatus> {
        let credentials = self.load_usable()?;
        let state = if credentials.csrf_token().is_some() {
            adopted(credentials)
        } else {
            CredentialState::Expired { credentials }
        };
        Some(AuthStatus::from_state(&state, now_unix()))
    }

    /// Forgets all credentials, in memory and on disk.
    pub fn reset(&self) -> Result<(), AuthError> {
        self.set_state(CredentialState::Unauthenticated);
        self.inner.store.clear()?;
        info!("credentials reset");
        Ok(())
    }

    async fn bootstrap(&self) -> bool {
        let gate = self.inner.token_gate.lock().await;
        match self.state().kind() {
            StateKind::Authenticated => return true,
            StateKind::Expired => {
                drop(gate);
                return self.refresh().await;
            }
            StateKind::Unauthenticated => {}
        }

        match self.load_usable() {
            Some(credentials) => {
                if let Some(refreshed) = self.refresh_tokens(&credentials).await {
                    info!("adopted persisted credentials");
                    self.commit(refreshed);
                    return true;
                }
                if credentials.csrf_token().is_some() {
                    warn!("token refresh with persisted cookies failed; using the stored token");
                    self.set_state(adopted(credentials));
                    return true;
                }
                warn!("persisted credentials carry no token and none could be minted; escalating to full recovery");
                self.set_state(CredentialState::Expired { credentials });
            }
            None => debug!("no usable persisted credentials; escalating to full recovery"),
        }

        drop(gate);
        self.refresh().await
    }

    async fn refresh_proactively(&self, credentials: &Credentials) {
        let Ok(_gate) = self.inner.token_gate.try_lock() else {
            debug!("proactive token refresh already running");
            return;
        };

        match self.refresh_tokens(credentials).await {
            Some(refreshed) => {
                let unchanged = self
                    .state()
                    .held_credentials()
                    .is_some_and(|held| held.cookies == refreshed.cookies);
                if unchanged {
                    debug!("proactively refreshed anti-forgery token");
                    self.commit(refreshed);
                }
            }
            None => warn!("proactive token refresh failed; keeping current token"),
        }
    }

    async fn run_recovery(self) -> bool {
        info!("starting layered credential recovery");

        if let Some(credentials) = self.layer_token_refresh().await {
            info!(layer = "token_refresh", "credentials recovered");
            self.commit(credentials);
            return true;
        }

        if let Some(credentials) = self.layer_reload_persisted().await {
            info!(layer = "reload_persisted", "credentials recovered");
            self.commit(credentials);
            return true;
        }

        if let Some(credentials) = self.layer_browser().await {
            info!(layer = "browser", "credentials recovered");
            self.commit(credentials);
            return true;
        }

        let exhausted = {
            let mut state = lock_unpoisoned(&self.inner.state);
            let next = state.exhausted();
            *state = next;
            state.kind()
        };
        warn!(
            state = exhausted.as_str(),
            "credential recovery exhausted; manual credential entry required"
        );
        false
    }

    /// Layer 1: mint new tokens with the cookies already held.
    async fn layer_token_refresh(&self) -> Option<Credentials> {
        let held = self.state().held_credentials().cloned()?;
        self.refresh_tokens(&held).await
    }

    /// Layer 2: re-read the credential file, which another process may have updated.
    async fn layer_reload_persisted(&self) -> Option<Credentials> {
        let reloaded = self.load_usable()?;
        self.set_state(CredentialState::Expired {
            credentials: reloaded.clone(),
        });
        self.refresh_tokens(&reloaded).await
    }

    /// Layer 3: ask the browser collaborator for a complete credential set.
    async fn layer_browser(&self) -> Option<Credentials> {
        if !self.inner.config.browser_refresh {
            debug!("browser-assisted refresh disabled");
            return None;
        }
        let Some(browser) = self.inner.browser.as_ref() else {
            debug!("no browser refresher configured");
            return None;
        };

        let mut fresh = browser.refresh_via_browser(&self.inner.config).await?;
        if !fresh.has_required_cookies() {
            warn!(
                missing = ?fresh.missing_cookies(),
                "browser refresh returned incomplete cookies"
            );
            return None;
        }
        if fresh.extracted_at <= 0 {
            fresh.extracted_at = now_unix();
        }
        if fresh.csrf_token().is_some() {
            return Some(fresh);
        }
        self.refresh_tokens(&fresh).await
    }

    /// Fetches the landing page with `credentials`' cookies and scans it for fresh
    /// page tokens. Succeeds only when the anti-forgery token is found.
    async fn refresh_tokens(&self, credentials: &Credentials) -> Option<Credentials> {
        let config = &self.inner.config;
        let response = match self
            .inner
            .http
            .get(&config.landing_url)
            .header(COOKIE, credentials.cookie_header())
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                warn!(%error, "landing page fetch failed");
                return None;
            }
        };

        if is_login_redirect(response.url(), &config.login_hosts) {
            warn!(
                host = response.url().host_str().unwrap_or_default(),
                "landing page redirected to login; cookies are no longer valid"
            );
            return None;
        }
        if !response.status().is_success() {
            warn!(status = %response.status(), "landing page returned an error status");
            return None;
        }

        let html = match response.text().await {
            Ok(html) => html,
            Err(error) => {
                warn!(%error, "failed to read landing page body");
                return None;
            }
        };

        let tokens = extract_page_tokens(&html);
        let Some(csrf_token) = tokens.csrf_token else {
            warn!("landing page did not contain an anti-forgery token");
            return None;
        };

        let mut refreshed = credentials.clone();
        refreshed.csrf_token = Some(csrf_token);
        if let Some(session_id) = tokens.session_id {
            refreshed.session_id = Some(session_id);
        }
        refreshed.extracted_at = now_unix();
        debug!(
            has_session_id = refreshed.session_id().is_some(),
            "minted fresh page tokens"
        );
        Some(refreshed)
    }

    /// Persisted credentials that pass the cookie gate and the age limit.
    /// Missing and corrupt files are treated alike.
    fn load_usable(&self) -> Option<Credentials> {
        let credentials = match self.inner.store.load() {
            Ok(Some(credentials)) => credentials,
            Ok(None) => {
                debug!("no persisted credentials");
                return None;
            }
            Err(error) => {
                warn!(%error, "persisted credentials unreadable");
                return None;
            }
        };

        if !credentials.has_required_cookies() {
            warn!(
                missing = ?credentials.missing_cookies(),
                "persisted cookies are incomplete"
            );
            return None;
        }

        let now = now_unix();
        if credentials.is_older_than(self.inner.config.max_credential_age, now) {
            warn!(
                age_secs = credentials.age_secs(now),
                "persisted credentials exceed the maximum age"
            );
            return None;
        }

        Some(credentials)
    }

    fn token_refresh_due(&self, token_refreshed_at: i64) -> bool {
        now_unix().saturating_sub(token_refreshed_at)
            >= self.inner.config.proactive_refresh_after_secs()
    }

    fn commit(&self, credentials: Credentials) {
        if let Err(error) = self.inner.store.save(&credentials) {
            warn!(%error, "failed to persist refreshed credentials");
        }
        self.set_state(CredentialState::Authenticated {
            credentials,
            token_refreshed_at: now_unix(),
        });
    }

    fn set_state(&self, next: CredentialState) {
        let mut state = lock_unpoisoned(&self.inner.state);
        if state.kind() != next.kind() {
            debug!(
                from = state.kind().as_str(),
                to = next.kind().as_str(),
                "credential state transition"
            );
        }
        *state = next;
    }
}

/// Persisted credentials taken as-is; the token is as old as the extraction.
fn adopted(credentials: Credentials) -> CredentialState {
    let token_refreshed_at = credentials.extracted_at;
    CredentialState::Authenticated {
        credentials,
        token_refreshed_at,
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
