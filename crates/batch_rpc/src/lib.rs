//! Client primitives for a cookie-authenticated batch-RPC web gateway.
//!
//! [`codec`] builds form bodies and decodes the prefixed, byte-count framed
//! response format. [`answer`] decodes the streamed conversational answer.
//! [`BatchRpcClient`] sends calls with backoff for transient failures and a
//! single credential-recovery retry for authentication failures, delegating
//! recovery to [`session_auth::CredentialManager`].

pub mod answer;
pub mod codec;
pub mod config;
pub mod error;
pub mod headers;
pub mod retry;
pub mod transport;
pub mod url;
pub mod value;

pub use answer::{history_param, AnswerFragment, AnswerStreamParser, FragmentKind, StreamedAnswer};
pub use codec::{
    decode_response, encode_request_body, encode_stream_body, extract_rpc_result, strict_encode,
    to_ascii_json, ChunkFramer, DecodeError,
};
pub use config::BatchRpcConfig;
pub use error::BatchRpcError;
pub use retry::RetryPolicy;
pub use transport::{BatchRpcClient, RpcCall};
pub use url::normalize_base_url;
