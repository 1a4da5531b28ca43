//! Request encoding and response decoding for the batch gateway.

use std::io;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::trace;

use crate::value::{error_codes, is_response_for, tuple_payload};

/// Anti-scraping prefix that precedes every response body.
pub const ANTI_XSSI_PREFIX: &str = ")]}'";
/// Error code meaning the gateway rejected the session credentials.
pub const AUTH_SENTINEL: i64 = 16;

/// Everything except alphanumerics and `-_.~`, so `!'()*` are escaped too.
const STRICT_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("gateway rejected the session credentials (error code {AUTH_SENTINEL})")]
    AuthExpired,
}

/// Compact JSON formatter that escapes every non-ASCII character as `\uXXXX`,
/// using surrogate pairs outside the basic multilingual plane.
#[derive(Debug, Clone, Copy, Default)]
pub struct AsciiFormatter;

impl Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (index, ch) in fragment.char_indices() {
            if ch.is_ascii() {
                continue;
            }
            writer.write_all(fragment[start..index].as_bytes())?;
            let mut units = [0_u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = index + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

/// Serializes `value` as compact JSON containing only ASCII.
pub fn to_ascii_json<T>(value: &T) -> Result<String, serde_json::Error>
where
    T: Serialize + ?Sized,
{
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, AsciiFormatter);
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Percent-encodes a form value, escaping `!'()*` along with every other
/// reserved character.
pub fn strict_encode(input: &str) -> String {
    utf8_percent_encode(input, STRICT_COMPONENT).to_string()
}

/// Form body for one batched call: `f.req=[[[id, params, null, "generic"]]]`,
/// then `at=<token>` when a token is held, then a trailing `&`.
pub fn encode_request_body(
    rpc_id: &str,
    params: &Value,
    csrf_token: Option<&str>,
) -> Result<String, serde_json::Error> {
    let params_json = to_ascii_json(params)?;
    let envelope = json!([[[rpc_id, params_json, Value::Null, "generic"]]]);
    Ok(form_body(&to_ascii_json(&envelope)?, csrf_token))
}

/// Form body for the streamed query endpoint: `f.req=[null, params]`.
pub fn encode_stream_body(
    params: &Value,
    csrf_token: Option<&str>,
) -> Result<String, serde_json::Error> {
    let params_json = to_ascii_json(params)?;
    let envelope = json!([Value::Null, params_json]);
    Ok(form_body(&to_ascii_json(&envelope)?, csrf_token))
}

fn form_body(f_req: &str, csrf_token: Option<&str>) -> String {
    let mut body = format!("f.req={}", strict_encode(f_req));
    if let Some(token) = csrf_token {
        body.push_str("&at=");
        body.push_str(&strict_encode(token));
    }
    body.push('&');
    body
}

/// Incremental splitter for the gateway's line framing.
///
/// Strips the anti-scraping prefix, skips byte-count lines and yields each
/// line that parses as JSON. Lines that parse under neither reading are dropped.
#[derive(Debug, Default)]
pub struct ChunkFramer {
    buffer: Vec<u8>,
    seen_first_line: bool,
    awaiting_counted_line: bool,
}

impl ChunkFramer {
    /// Feeds raw bytes and drains every complete chunk.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Value> {
        self.buffer.extend_from_slice(bytes);
        let mut chunks = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            self.push_line(&String::from_utf8_lossy(&line[..newline]), &mut chunks);
        }

        chunks
    }

    /// Flushes a final unterminated line.
    pub fn finish(&mut self) -> Vec<Value> {
        let mut chunks = Vec::new();
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.push_line(&String::from_utf8_lossy(&line), &mut chunks);
        }
        chunks
    }

    fn push_line(&mut self, line: &str, chunks: &mut Vec<Value>) {
        let mut line = line.trim_end_matches('\r');
        if !self.seen_first_line {
            self.seen_first_line = true;
            if let Some(rest) = line.trim_start().strip_prefix(ANTI_XSSI_PREFIX) {
                line = rest;
            }
        }

        let line = line.trim();
        if line.is_empty() {
            return;
        }

        if !self.awaiting_counted_line && is_byte_count(line) {
            self.awaiting_counted_line = true;
            return;
        }
        self.awaiting_counted_line = false;

        match serde_json::from_str::<Value>(line) {
            Ok(chunk) => chunks.push(chunk),
            Err(error) => trace!(%error, len = line.len(), "skipping non-JSON response line"),
        }
    }
}

fn is_byte_count(line: &str) -> bool {
    line.bytes().all(|byte| byte.is_ascii_digit())
}

/// Decodes a complete response body into its JSON chunks.
pub fn decode_response(body: &str) -> Vec<Value> {
    let mut framer = ChunkFramer::default();
    let mut chunks = framer.feed(body.as_bytes());
    chunks.extend(framer.finish());
    chunks
}

/// Finds the payload answering `rpc_id`.
///
/// A string payload is parsed as JSON, falling back to the raw string; other
/// payloads are returned as-is. `Ok(None)` means no matching tuple or a null
/// payload. The authentication sentinel in the matching tuple's error slot is
/// always an error, whatever the other positions hold.
pub fn extract_rpc_result(chunks: &[Value], rpc_id: &str) -> Result<Option<Value>, DecodeError> {
    let Some(tuple) = find_response(chunks, rpc_id) else {
        return Ok(None);
    };

    if error_codes(tuple).contains(&AUTH_SENTINEL) {
        return Err(DecodeError::AuthExpired);
    }

    Ok(match tuple_payload(tuple) {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) => {
            Some(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone())))
        }
        Some(other) => Some(other.clone()),
    })
}

/// Non-empty error codes carried by the tuple answering `rpc_id`.
pub fn rpc_error_codes(chunks: &[Value], rpc_id: &str) -> Option<Vec<i64>> {
    let codes = error_codes(find_response(chunks, rpc_id)?);
    (!codes.is_empty()).then_some(codes)
}

fn find_response<'a>(chunks: &'a [Value], rpc_id: &str) -> Option<&'a Value> {
    chunks
        .iter()
        .filter_map(Value::as_array)
        .flatten()
        .find(|item| is_response_for(item, rpc_id))
}
