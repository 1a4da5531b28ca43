use std::sync::Arc;

use batch_rpc::{history_param, BatchRpcClient, BatchRpcError, RpcCall};
use credential_store::{ConversationStore, ConversationTurn, CredentialStore, Credentials, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use session_auth::{
    AuthError, AuthStatus, BrowserRefresher, CredentialManager, HelperCommandRefresher,
    StateKind,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::BridgeConfig;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Rpc(#[from] BatchRpcError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("the service returned an empty answer")]
    EmptyAnswer,
}

impl BridgeError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Rpc(error) => error.code(),
            Self::Auth(error) => error.code(),
            Self::Store(_) => "storage_error",
            Self::EmptyAnswer => "empty_answer",
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rpc(error) => error.is_retryable(),
            Self::EmptyAnswer => true,
            Self::Auth(_) | Self::Store(_) => false,
        }
    }

    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Rpc(error) => error.suggestion(),
            Self::Auth(error) => auth_suggestion(error),
            Self::Store(_) => Some("Check that the data directory is writable."),
            Self::EmptyAnswer => Some("Resubmit the question; the answer stream was cut short."),
        }
    }
}

pub(crate) fn auth_suggestion(error: &AuthError) -> Option<&'static str> {
    match error {
        AuthError::MissingCookies { .. } => Some(
            "Copy the complete Cookie header from a signed-in browser request to the service.",
        ),
        AuthError::RecoveryExhausted => Some(
            "Run `notebook-bridge login` with a fresh Cookie header copied from a signed-in browser.",
        ),
        AuthError::Store(_) => Some("Check that the data directory is writable."),
        AuthError::HttpClient(_) => None,
    }
}

/// A conversational question over one or more notebook sources.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AskRequest {
    pub query: String,
    pub source_ids: Vec<String>,
    /// Continues an existing conversation when set.
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    pub conversation_id: String,
    pub turn_number: u32,
    pub is_follow_up: bool,
}

/// Credential snapshot plus whether a credential file is on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeStatus {
    #[serde(flatten)]
    pub auth: AuthStatus,
    pub persisted: bool,
    /// The snapshot was read from the credential file because this process
    /// has not loaded credentials yet.
    pub from_disk: bool,
}

/// Wires the credential store, recovery manager, transport and conversation
/// history together.
#[derive(Debug)]
pub struct NotebookBridge {
    client: BatchRpcClient,
    conversations: ConversationStore,
}

impl NotebookBridge {
    pub fn new(config: &BridgeConfig) -> Result<Self, BridgeError> {
        let browser = config
            .browser_helper
            .as_deref()
            .and_then(HelperCommandRefresher::from_command_line)
            .map(|helper| Arc::new(helper) as Arc<dyn BrowserRefresher>);
        if browser.is_none() && config.browser_refresh {
            debug!("no browser helper configured; browser recovery layer is inert");
        }

        let auth = CredentialManager::new(
            config.auth_config(),
            CredentialStore::new(config.auth_file()),
            browser,
        )?;
        let client = BatchRpcClient::new(config.rpc_config(), auth)?;
        Ok(Self::from_parts(
            client,
            ConversationStore::new(config.conversations_file()),
        ))
    }

    pub fn from_parts(client: BatchRpcClient, conversations: ConversationStore) -> Self {
        Self {
            client,
            conversations,
        }
    }

    pub fn client(&self) -> &BatchRpcClient {
        &self.client
    }

    pub fn auth(&self) -> &CredentialManager {
        self.client.auth()
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    /// Adopts a pasted `Cookie` header with optional page tokens.
    pub async fn login(
        &self,
        cookie_header: &str,
        csrf_token: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<AuthStatus, BridgeError> {
        let mut credentials = Credentials::from_cookie_header(cookie_header);
        if let Some(token) = csrf_token.filter(|token| !token.trim().is_empty()) {
            credentials = credentials.with_csrf_token(token.trim());
        }
        if let Some(session_id) = session_id.filter(|id| !id.trim().is_empty()) {
            credentials = credentials.with_session_id(session_id.trim());
        }
        Ok(self.auth().adopt_manual(credentials).await?)
    }

    /// Reports the in-memory state, or what the credential file would yield
    /// when nothing has been loaded yet. Never touches the network.
    ///
    /// An unreadable credential file counts as not persisted.
    pub fn status(&self) -> BridgeStatus {
        let persisted = matches!(self.auth().store().load(), Ok(Some(_)));
        let live = self.auth().status();
        if live.state == StateKind::Unauthenticated {
            if let Some(auth) = self.auth().persisted_status() {
                return BridgeStatus {
                    auth,
                    persisted,
                    from_disk: true,
                };
            }
        }
        BridgeStatus {
            auth: live,
            persisted,
            from_disk: false,
        }
    }

    /// Forces layered credential recovery.
    pub async fn refresh(&self) -> Result<AuthStatus, BridgeError> {
        if self.auth().refresh().await {
            Ok(self.auth().status())
        } else {
            Err(AuthError::RecoveryExhausted.into())
        }
    }

    pub fn logout(&self) -> Result<(), BridgeError> {
        Ok(self.auth().reset()?)
    }

    /// Raw batched call; `Ok(None)` when the response carried no payload.
    pub async fn call(&self, call: &RpcCall) -> Result<Option<Value>, BridgeError> {
        Ok(self.client.call(call).await?)
    }

    /// Asks a question over the given sources, continuing the conversation
    /// when `conversation_id` names one with stored turns.
    ///
    /// A turn is recorded only after a non-empty answer arrives.
    pub async fn ask(&self, request: &AskRequest) -> Result<AskResponse, BridgeError> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(BatchRpcError::Validation("query is empty".to_owned()).into());
        }
        let source_ids: Vec<&str> = request
            .source_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .collect();
        if source_ids.is_empty() {
            return Err(
                BatchRpcError::Validation("at least one source id is required".to_owned()).into(),
            );
        }

        let (conversation_id, history) = match request
            .conversation_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        {
            Some(id) => (id.to_owned(), self.conversations.history(id)?),
            None => (ConversationStore::new_conversation_id(), Vec::new()),
        };
        let is_follow_up = !history.is_empty();

        let params = query_params(&source_ids, query, &history, &conversation_id);
        let streamed = self.client.stream_query(&params).await?;
        if streamed.is_empty() {
            return Err(BridgeError::EmptyAnswer);
        }

        let answer = streamed.text().to_owned();
        let turn = self.conversations.append(&conversation_id, query, answer.as_str())?;
        info!(
            %conversation_id,
            turn_number = turn.turn_number,
            sources = source_ids.len(),
            answer_chars = answer.chars().count(),
            "answered query"
        );

        Ok(AskResponse {
            answer,
            conversation_id,
            turn_number: turn.turn_number,
            is_follow_up,
        })
    }
}

/// `[[[[id]]...], query, history|null, [2,null,[1]], conversationId]`.
pub fn query_params(
    source_ids: &[&str],
    query: &str,
    history: &[ConversationTurn],
    conversation_id: &str,
) -> Value {
    let sources: Vec<Value> = source_ids.iter().map(|id| json!([[id]])).collect();
    json!([
        sources,
        query,
        history_param(history),
        [2, null, [1]],
        conversation_id
    ])
}
