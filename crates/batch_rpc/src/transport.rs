use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use credential_store::Credentials;
use futures_util::StreamExt;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use session_auth::CredentialManager;
use tracing::{debug, warn};

use crate::answer::{AnswerFragment, AnswerStreamParser, StreamedAnswer};
use crate::codec::{
    decode_response, encode_request_body, encode_stream_body, extract_rpc_result, rpc_error_codes,
};
use crate::config::BatchRpcConfig;
use crate::error::{parse_error_message, BatchRpcError};
use crate::headers::build_headers;
use crate::retry::{is_auth_status, is_retryable_status};
use crate::url::{batch_execute_url, stream_query_url};

/// Increment between successive `_reqid` values.
const REQ_ID_STEP: u64 = 100_000;

/// One batched call: an opaque call identifier, its parameters, an optional
/// routing hint and an optional timeout override.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcCall {
    pub rpc_id: String,
    pub params: Value,
    pub source_path: Option<String>,
    pub timeout: Option<Duration>,
}

impl RpcCall {
    pub fn new(rpc_id: impl Into<String>, params: Value) -> Self {
        Self {
            rpc_id: rpc_id.into(),
            params,
            source_path: None,
            timeout: None,
        }
    }

    pub fn with_source_path(mut self, source_path: impl Into<String>) -> Self {
        self.source_path = Some(source_path.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Gateway client. Every call first makes sure credentials are usable, then
/// retries transient failures with backoff and authentication failures once
/// after credential recovery.
pub struct BatchRpcClient {
    http: Client,
    config: BatchRpcConfig,
    auth: CredentialManager,
    next_req_id: AtomicU64,
}

impl fmt::Debug for BatchRpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchRpcClient")
            .field("config", &self.config)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

enum Target<'a> {
    Batch(&'a RpcCall),
    Stream(&'a Value),
}

/// How one attempt failed, which decides what the retry loop does next.
enum AttemptError {
    /// 401/403 or the authentication sentinel.
    Auth { forbidden: bool, message: String },
    /// Retried with backoff; surfaced once the budget is spent.
    Transient(BatchRpcError),
    Fatal(BatchRpcError),
}

impl From<BatchRpcError> for AttemptError {
    fn from(error: BatchRpcError) -> Self {
        match error {
            BatchRpcError::AuthExpired { message } => Self::Auth {
                forbidden: false,
                message,
            },
            other => Self::Fatal(other),
        }
    }
}

/// Accumulates one response body; reset before every attempt.
trait ResponseDecoder {
    type Output;

    fn reset(&mut self);
    fn feed(&mut self, bytes: &[u8]) -> Result<(), BatchRpcError>;
    fn finish(&mut self) -> Result<Self::Output, BatchRpcError>;
}

struct BatchDecoder<'a> {
    rpc_id: &'a str,
    body: Vec<u8>,
}

impl ResponseDecoder for BatchDecoder<'_> {
    type Output = Option<Value>;

    fn reset(&mut self) {
        self.body.clear();
    }

    fn feed(&mut self, bytes: &[u8]) -> Result<(), BatchRpcError> {
        self.body.extend_from_slice(bytes);
        Ok(())
    }

    fn finish(&mut self) -> Result<Self::Output, BatchRpcError> {
        let body = String::from_utf8_lossy(&self.body);
        let chunks = decode_response(&body);
        if let Some(payload) = extract_rpc_result(&chunks, self.rpc_id)? {
            return Ok(Some(payload));
        }
        match rpc_error_codes(&chunks, self.rpc_id) {
            Some(codes) => Err(BatchRpcError::Rpc {
                rpc_id: self.rpc_id.to_owned(),
                codes,
            }),
            None => Ok(None),
        }
    }
}

struct StreamDecoder<F> {
    parser: AnswerStreamParser,
    on_fragment: F,
}

impl<F> ResponseDecoder for StreamDecoder<F>
where
    F: FnMut(&AnswerFragment),
{
    type Output = StreamedAnswer;

    fn reset(&mut self) {
        self.parser = AnswerStreamParser::default();
    }

    fn feed(&mut self, bytes: &[u8]) -> Result<(), BatchRpcError> {
        for fragment in self.parser.feed(bytes)? {
            (self.on_fragment)(&fragment);
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<Self::Output, BatchRpcError> {
        Ok(std::mem::take(&mut self.parser).finish()?)
    }
}

impl BatchRpcClient {
    pub fn new(config: BatchRpcConfig, auth: CredentialManager) -> Result<Self, BatchRpcError> {
        let http = Client::builder()
            .build()
            .map_err(|error| BatchRpcError::InvalidConfig(error.to_string()))?;
        let first_req_id = rand::thread_rng().gen_range(1_000..10_000);
        Ok(Self {
            http,
            config,
            auth,
            next_req_id: AtomicU64::new(first_req_id),
        })
    }

    pub fn config(&self) -> &BatchRpcConfig {
        &self.config
    }

    pub fn auth(&self) -> &CredentialManager {
        &self.auth
    }

    pub fn build_headers(&self, credentials: &Credentials) -> Result<HeaderMap, BatchRpcError> {
        let headers = build_headers(&self.config, credentials);
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
                    BatchRpcError::InvalidConfig(format!("invalid header key: {key}"))
                })?,
                HeaderValue::from_str(&value).map_err(|_| {
                    BatchRpcError::InvalidConfig(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    /// Executes one batched call and returns its decoded payload.
    ///
    /// `Ok(None)` means the response held no payload for the call.
    pub async fn call(&self, call: &RpcCall) -> Result<Option<Value>, BatchRpcError> {
        if call.rpc_id.trim().is_empty() {
            return Err(BatchRpcError::Validation("call identifier is empty".to_owned()));
        }

        let timeout = call.timeout.unwrap_or(self.config.timeout);
        let mut decoder = BatchDecoder {
            rpc_id: &call.rpc_id,
            body: Vec::new(),
        };
        self.execute(&Target::Batch(call), timeout, &mut decoder)
            .await
    }

    /// Runs a streamed conversational query, reporting accepted fragments
    /// as they arrive.
    ///
    /// Fragments are reported live, so when an attempt fails part-way (an
    /// authentication sentinel mid-stream, a dropped body) the handler has
    /// already seen that attempt's fragments and the retry reports the new
    /// attempt's fragments from the start. Only the returned
    /// [`StreamedAnswer`] is built from the successful attempt alone.
    pub async fn stream_query_with_handler<F>(
        &self,
        params: &Value,
        on_fragment: F,
    ) -> Result<StreamedAnswer, BatchRpcError>
    where
        F: FnMut(&AnswerFragment),
    {
        let mut decoder = StreamDecoder {
            parser: AnswerStreamParser::default(),
            on_fragment,
        };
        self.execute(&Target::Stream(params), self.config.stream_timeout, &mut decoder)
            .await
    }

    pub async fn stream_query(&self, params: &Value) -> Result<StreamedAnswer, BatchRpcError> {
        self.stream_query_with_handler(params, |_| {}).await
    }

    async fn execute<D>(
        &self,
        target: &Target<'_>,
        timeout: Duration,
        decoder: &mut D,
    ) -> Result<D::Output, BatchRpcError>
    where
        D: ResponseDecoder,
    {
        if !self.auth.ensure_valid().await {
            return Err(BatchRpcError::auth_expired(
                "no usable credentials and recovery failed",
            ));
        }

        let retry = self.config.retry;
        let mut auth_retried = false;
        let mut transient_retries = 0_u32;

        loop {
            match self.attempt(target, timeout, decoder).await {
                Ok(output) => return Ok(output),
                Err(AttemptError::Fatal(error)) => return Err(error),
                Err(AttemptError::Auth { forbidden, message }) => {
                    if auth_retried {
                        return Err(if forbidden {
                            BatchRpcError::AuthInvalid { message }
                        } else {
                            BatchRpcError::AuthExpired { message }
                        });
                    }
                    auth_retried = true;
                    warn!(%message, "gateway rejected credentials; running recovery");
                    if !self.auth.refresh().await {
                        return Err(BatchRpcError::auth_expired(format!(
                            "credential recovery failed after: {message}"
                        )));
                    }
                }
                Err(AttemptError::Transient(error)) => {
                    if transient_retries >= retry.max_retries {
                        return Err(error);
                    }
                    let delay = retry.delay(transient_retries);
                    transient_retries += 1;
                    warn!(
                        %error,
                        retry = transient_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "transient gateway failure; backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt<D>(
        &self,
        target: &Target<'_>,
        timeout: Duration,
        decoder: &mut D,
    ) -> Result<D::Output, AttemptError>
    where
        D: ResponseDecoder,
    {
        let Some(credentials) = self.auth.credentials() else {
            return Err(AttemptError::Auth {
                forbidden: false,
                message: "credentials were invalidated by a concurrent recovery".to_owned(),
            });
        };

        let request = self.build_request(target, &credentials)?.timeout(timeout);
        let response = request.send().await.map_err(|error| {
            AttemptError::Transient(BatchRpcError::network(describe_request_error(&error)))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, parse_error_message(status, &body)));
        }

        decoder.reset();
        let mut bytes = response.bytes_stream();
        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|error| {
                AttemptError::Transient(BatchRpcError::network(describe_request_error(&error)))
            })?;
            decoder.feed(&chunk)?;
        }
        Ok(decoder.finish()?)
    }

    fn build_request(
        &self,
        target: &Target<'_>,
        credentials: &Credentials,
    ) -> Result<RequestBuilder, BatchRpcError> {
        let csrf_token = credentials.csrf_token();
        let session_id = credentials.session_id();

        let (url, body) = match target {
            Target::Batch(call) => {
                debug!(rpc_id = %call.rpc_id, "sending batched call");
                (
                    batch_execute_url(&self.config, &call.rpc_id, call.source_path.as_deref(), session_id),
                    encode_request_body(&call.rpc_id, &call.params, csrf_token),
                )
            }
            Target::Stream(params) => {
                let req_id = self.next_req_id.fetch_add(REQ_ID_STEP, Ordering::Relaxed);
                debug!(req_id, "sending streamed query");
                (
                    stream_query_url(&self.config, req_id, session_id),
                    encode_stream_body(params, csrf_token),
                )
            }
        };
        let body = body.map_err(|error| {
            BatchRpcError::Validation(format!("parameters are not serializable: {error}"))
        })?;

        Ok(self
            .http
            .post(url)
            .headers(self.build_headers(credentials)?)
            .body(body))
    }
}

fn classify_status(status: StatusCode, message: String) -> AttemptError {
    let code = status.as_u16();
    if is_auth_status(code) {
        return AttemptError::Auth {
            forbidden: status == StatusCode::FORBIDDEN,
            message: format!("HTTP {code}: {message}"),
        };
    }
    if code == 429 {
        return AttemptError::Transient(BatchRpcError::RateLimited { message });
    }
    if is_retryable_status(code) {
        return AttemptError::Transient(BatchRpcError::ServerError {
            status: code,
            message,
        });
    }
    AttemptError::Fatal(BatchRpcError::Status {
        status: code,
        message,
    })
}

fn describe_request_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("request timed out: {error}")
    } else if error.is_connect() {
        format!("connection failed: {error}")
    } else {
        error.to_string()
    }
}
