//! Credential lifecycle for a cookie-authenticated browser session.
//!
//! [`CredentialManager`] owns the `Unauthenticated` / `Authenticated` / `Expired`
//! state and recovers from token or cookie expiry by trying, cheapest first:
//!
//! 1. minting fresh page tokens from the landing page with the held cookies,
//! 2. reloading the persisted credential file and minting tokens with it,
//! 3. asking a [`BrowserRefresher`] for a complete fresh credential set.
//!
//! Only one recovery runs at a time; concurrent callers share its outcome.

pub mod browser;
pub mod config;
pub mod error;
pub mod manager;
pub mod state;
pub mod tokens;

pub use browser::{BrowserRefresher, HelperCommandRefresher};
pub use config::AuthConfig;
pub use error::AuthError;
pub use manager::CredentialManager;
pub use state::{AuthStatus, CredentialState, StateKind};
