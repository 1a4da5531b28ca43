use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::schema::ConversationTurn;
use crate::store::{read_json, write_json};

/// Conversation id → ordered turns, persisted as a single JSON object.
pub type ConversationMap = BTreeMap<String, Vec<ConversationTurn>>;

/// Append-only conversation history keyed by client-generated conversation ids.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    path: PathBuf,
}

impl ConversationStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fresh random conversation id.
    #[must_use]
    pub fn new_conversation_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn load_all(&self) -> Result<ConversationMap, StoreError> {
        Ok(read_json::<ConversationMap>(&self.path)?.unwrap_or_default())
    }

    /// Turns for `conversation_id`, oldest first. Unknown ids have no history.
    pub fn history(&self, conversation_id: &str) -> Result<Vec<ConversationTurn>, StoreError> {
        Ok(self
            .load_all()?
            .remove(conversation_id)
            .unwrap_or_default())
    }

    /// Appends one turn and returns it with its assigned 1-based turn number.
    pub fn append(
        &self,
        conversation_id: &str,
        query: impl Into<String>,
        answer: impl Into<String>,
    ) -> Result<ConversationTurn, StoreError> {
        let mut conversations = self.load_all()?;
        let turns = conversations
            .entry(conversation_id.to_owned())
            .or_default();
        let turn = ConversationTurn {
            query: query.into(),
            answer: answer.into(),
            turn_number: u32::try_from(turns.len() + 1).unwrap_or(u32::MAX),
        };
        turns.push(turn.clone());

        write_json(&self.path, "conversations", &conversations)?;
        debug!(
            conversation_id,
            turn_number = turn.turn_number,
            "appended conversation turn"
        );
        Ok(turn)
    }

    /// Drops a conversation; returns whether it existed.
    pub fn remove(&self, conversation_id: &str) -> Result<bool, StoreError> {
        let mut conversations = self.load_all()?;
        if conversations.remove(conversation_id).is_none() {
            return Ok(false);
        }
        write_json(&self.path, "conversations", &conversations)?;
        Ok(true)
    }
}
