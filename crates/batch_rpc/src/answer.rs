//! Decoder for the streamed conversational answer.
//!
//! The stream reuses the gateway's line framing, but each response tuple
//! carries a JSON string whose `[0][0]` is a text fragment and whose `[0][4]`
//! ends with a type tag (`1` for the final answer, anything else for
//! intermediate reasoning). Fragments grow as the answer streams, so the
//! longest fragment of each kind is kept. That rule follows observed
//! behavior rather than a documented guarantee.

use credential_store::ConversationTurn;
use serde_json::{json, Value};
use tracing::debug;

use crate::codec::{ChunkFramer, DecodeError, AUTH_SENTINEL};
use crate::value::{at_path, error_codes, is_response_tuple, tuple_payload};

/// Fragments this short or shorter are control noise, not content.
pub const MIN_FRAGMENT_CHARS: usize = 20;
/// Trailing type tag that marks the final answer.
pub const ANSWER_TYPE_TAG: i64 = 1;

/// History tag for a previous answer.
const HISTORY_ANSWER_TAG: i64 = 2;
/// History tag for a previous query.
const HISTORY_QUERY_TAG: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    Answer,
    Reasoning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerFragment {
    pub kind: FragmentKind,
    pub text: String,
}

/// Longest fragment seen of each kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamedAnswer {
    pub answer: Option<String>,
    pub reasoning: Option<String>,
}

impl StreamedAnswer {
    /// The answer when one was seen, else the reasoning, else empty.
    pub fn text(&self) -> &str {
        self.answer
            .as_deref()
            .or(self.reasoning.as_deref())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.text().is_empty()
    }

    fn keep_longest(&mut self, fragment: &AnswerFragment) {
        let slot = match fragment.kind {
            FragmentKind::Answer => &mut self.answer,
            FragmentKind::Reasoning => &mut self.reasoning,
        };
        let longer = slot
            .as_ref()
            .map_or(true, |current| fragment.text.chars().count() > current.chars().count());
        if longer {
            *slot = Some(fragment.text.clone());
        }
    }
}

/// Incremental parser for the streamed answer body.
#[derive(Debug, Default)]
pub struct AnswerStreamParser {
    framer: ChunkFramer,
    best: StreamedAnswer,
}

impl AnswerStreamParser {
    /// Feeds raw bytes and returns the fragments accepted from them.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<AnswerFragment>, DecodeError> {
        let chunks = self.framer.feed(bytes);
        self.accept(&chunks)
    }

    /// Flushes the final line and returns the best fragments seen.
    pub fn finish(mut self) -> Result<StreamedAnswer, DecodeError> {
        let chunks = self.framer.finish();
        self.accept(&chunks)?;
        Ok(self.best)
    }

    /// Parses a complete body in one shot.
    pub fn parse_body(body: &str) -> Result<StreamedAnswer, DecodeError> {
        let mut parser = Self::default();
        parser.feed(body.as_bytes())?;
        parser.finish()
    }

    fn accept(&mut self, chunks: &[Value]) -> Result<Vec<AnswerFragment>, DecodeError> {
        let mut accepted = Vec::new();
        for chunk in chunks {
            for fragment in fragments_in_chunk(chunk)? {
                self.best.keep_longest(&fragment);
                accepted.push(fragment);
            }
        }
        Ok(accepted)
    }
}

fn fragments_in_chunk(chunk: &Value) -> Result<Vec<AnswerFragment>, DecodeError> {
    let Some(items) = chunk.as_array() else {
        return Ok(Vec::new());
    };

    let mut fragments = Vec::new();
    for item in items.iter().filter(|item| is_response_tuple(item)) {
        let codes = error_codes(item);
        if codes.contains(&AUTH_SENTINEL) {
            return Err(DecodeError::AuthExpired);
        }
        if !codes.is_empty() {
            debug!(?codes, "skipping answer tuple with error codes");
            continue;
        }

        let Some(Value::String(inner)) = tuple_payload(item) else {
            continue;
        };
        let Ok(inner) = serde_json::from_str::<Value>(inner) else {
            continue;
        };
        fragments.extend(fragment_from_inner(&inner));
    }
    Ok(fragments)
}

fn fragment_from_inner(inner: &Value) -> Option<AnswerFragment> {
    let text = at_path(inner, &[0, 0])?.as_str()?;
    if text.chars().count() <= MIN_FRAGMENT_CHARS {
        return None;
    }

    let tag = at_path(inner, &[0, 4])
        .and_then(Value::as_array)
        .and_then(|tags| tags.last())
        .and_then(Value::as_i64);
    let kind = if tag == Some(ANSWER_TYPE_TAG) {
        FragmentKind::Answer
    } else {
        FragmentKind::Reasoning
    };

    Some(AnswerFragment {
        kind,
        text: text.to_owned(),
    })
}

/// History parameter for a follow-up query: each prior turn, oldest first,
/// as `[answer, null, 2]` then `[query, null, 1]`. `null` when there is none.
pub fn history_param(turns: &[ConversationTurn]) -> Value {
    if turns.is_empty() {
        return Value::Null;
    }

    let mut ordered: Vec<&ConversationTurn> = turns.iter().collect();
    ordered.sort_by_key(|turn| turn.turn_number);

    Value::Array(
        ordered
            .into_iter()
            .flat_map(|turn| {
                [
                    json!([turn.answer, Value::Null, HISTORY_ANSWER_TAG]),
                    json!([turn.query, Value::Null, HISTORY_QUERY_TAG]),
                ]
            })
            .collect(),
    )
}
