//! Client for a notebook service's private batch-RPC gateway.
//!
//! [`NotebookBridge`] wires the persisted credential file, the layered
//! credential recovery in [`session_auth`], and the resilient transport in
//! [`batch_rpc`] into one facade, and adds conversational queries whose
//! history is kept in a local conversation file.
//!
//! # Public API Overview
//! - Configure from `NOTEBOOK_BRIDGE_*` variables with [`BridgeConfig::from_env`].
//! - Sign in with a pasted cookie header via [`NotebookBridge::login`].
//! - Ask questions over sources with [`NotebookBridge::ask`], or issue raw
//!   calls with [`NotebookBridge::call`].
//! - Turn any failure into a structured [`ErrorReport`].

pub mod bridge;
pub mod config;
pub mod logging;
pub mod report;

pub use bridge::{
    query_params, AskRequest, AskResponse, BridgeError, BridgeStatus, NotebookBridge,
};
pub use config::BridgeConfig;
pub use report::ErrorReport;

pub use batch_rpc::{BatchRpcClient, BatchRpcConfig, BatchRpcError, RetryPolicy, RpcCall};
pub use credential_store::{ConversationStore, CredentialStore, Credentials};
pub use session_auth::{AuthConfig, AuthError, AuthStatus, CredentialManager, StateKind};
