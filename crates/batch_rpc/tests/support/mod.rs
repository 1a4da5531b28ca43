#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

#[derive(Clone)]
pub struct ResponseChunk {
    pub delay_ms: u64,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub enum ScriptedResponse {
    Respond {
        status: u16,
        content_type: &'static str,
        headers: Vec<(String, String)>,
        chunks: Vec<ResponseChunk>,
    },
    Reset,
}

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

pub struct ScriptedServer {
    pub base_url: String,
    request_count: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    handle: JoinHandle<()>,
}

impl ScriptedServer {
    pub async fn new(scripts: Vec<ScriptedResponse>) -> Self {
        let scripts = Arc::new(scripts);
        let request_count = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("local TCP listener should bind");
        let addr = listener
            .local_addr()
            .expect("resolved local listener address");
        let base_url = format!("http://{addr}");

        let handle = tokio::spawn({
            let scripts = Arc::clone(&scripts);
            let request_count = Arc::clone(&request_count);
            let requests = Arc::clone(&requests);

            async move {
                loop {
                    let (socket, _) = match listener.accept().await {
                        Ok(pair) => pair,
                        Err(_) => break,
                    };
                    let scripts = Arc::clone(&scripts);
                    let request_count = Arc::clone(&request_count);
                    let requests = Arc::clone(&requests);
                    tokio::spawn(async move {
                        serve_one(socket, scripts, request_count, requests).await;
                    });
                }
            }
        });

        Self {
            base_url,
            request_count,
            requests,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Acquire)
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        lock_unpoisoned(&self.requests).clone()
    }

    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for ScriptedServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn response_text(status: u16, content_type: &'static str, body: &str) -> ScriptedResponse {
    ScriptedResponse::Respond {
        status,
        content_type,
        headers: Vec::new(),
        chunks: vec![ResponseChunk {
            delay_ms: 0,
            bytes: body.as_bytes().to_vec(),
        }],
    }
}

pub fn response_html(body: &str) -> ScriptedResponse {
    response_text(200, "text/html; charset=utf-8", body)
}

pub fn response_redirect(location: &str) -> ScriptedResponse {
    ScriptedResponse::Respond {
        status: 302,
        content_type: "text/html",
        headers: vec![("Location".to_owned(), location.to_owned())],
        chunks: Vec::new(),
    }
}

/// Gateway response streamed in several delayed chunks.
pub fn response_chunks(status: u16, parts: &[(u64, &str)]) -> ScriptedResponse {
    ScriptedResponse::Respond {
        status,
        content_type: "application/json; charset=utf-8",
        headers: Vec::new(),
        chunks: parts
            .iter()
            .map(|(delay_ms, text)| ResponseChunk {
                delay_ms: *delay_ms,
                bytes: text.as_bytes().to_vec(),
            })
            .collect(),
    }
}

/// Framed gateway body carrying `payload_json` for `rpc_id`.
pub fn gateway_body(rpc_id: &str, payload_json: &str) -> String {
    let chunk = serde_json::json!([["wrb.fr", rpc_id, payload_json, null, null, null, "generic"]]).to_string();
    format!(")]}}'\n\n{}\n{chunk}\n", chunk.len())
}

/// Framed gateway body whose tuple for `rpc_id` carries error `codes`.
pub fn gateway_error_body(rpc_id: &str, codes: serde_json::Value) -> String {
    let chunk = serde_json::json!([["wrb.fr", rpc_id, null, null, null, codes, "generic"]]).to_string();
    format!(")]}}'\n\n{}\n{chunk}\n", chunk.len())
}

/// Gateway success response carrying `payload_json` for `rpc_id`.
pub fn response_gateway(rpc_id: &str, payload_json: &str) -> ScriptedResponse {
    response_text(200, "application/json; charset=utf-8", &gateway_body(rpc_id, payload_json))
}

/// Landing page embedding both page tokens.
pub fn landing_page(csrf_token: &str, session_id: &str) -> String {
    format!(
        r#"<html><script>window.WIZ_global_data = {{"FdrFJe":"{session_id}","SNlM0e":"{csrf_token}"}};</script></html>"#
    )
}

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        302 => "Found",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

async fn serve_one(
    mut socket: TcpStream,
    scripts: Arc<Vec<ScriptedResponse>>,
    request_count: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
) {
    let Ok(Some(request)) = read_request(&mut socket).await else {
        return;
    };
    lock_unpoisoned(&requests).push(request);

    let index = request_count.fetch_add(1, Ordering::AcqRel);
    let response = scripts
        .get(index)
        .cloned()
        .unwrap_or_else(|| response_text(500, "text/plain", "unexpected request"));

    match response {
        ScriptedResponse::Reset => {}
        ScriptedResponse::Respond {
            status,
            content_type,
            headers,
            chunks,
        } => {
            let mut head = format!(
                "HTTP/1.1 {status} {}\r\nContent-Type: {content_type}\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n",
                status_reason(status),
            );
            for (key, value) in headers {
                head.push_str(&format!("{key}: {value}\r\n"));
            }
            head.push_str("\r\n");

            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }

            for chunk in chunks {
                if chunk.delay_ms > 0 {
                    sleep(Duration::from_millis(chunk.delay_ms)).await;
                }
                if chunk.bytes.is_empty() {
                    continue;
                }
                let prefix = format!("{:X}\r\n", chunk.bytes.len());
                if socket.write_all(prefix.as_bytes()).await.is_err() {
                    return;
                }
                if socket.write_all(&chunk.bytes).await.is_err() {
                    return;
                }
                if socket.write_all(b"\r\n").await.is_err() {
                    return;
                }
            }

            let _ = socket.write_all(b"0\r\n\r\n").await;
            let _ = socket.shutdown().await;
        }
    }
}

async fn read_request(socket: &mut TcpStream) -> std::io::Result<Option<CapturedRequest>> {
    let mut raw = Vec::new();
    let mut buffer = [0_u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut buffer).await?;
        if n == 0 {
            return Ok(None);
        }
        raw.extend_from_slice(&buffer[..n]);
        if let Some(position) = raw.windows(4).position(|window| window == b"\r\n\r\n") {
            break position + 4;
        }
    };

    let head = String::from_utf8_lossy(&raw[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_owned();
    let target = parts.next().unwrap_or_default().to_owned();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_owned(), value.trim().to_owned()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = raw[header_end..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buffer[..n]);
    }

    Ok(Some(CapturedRequest {
        method,
        target,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    }))
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
