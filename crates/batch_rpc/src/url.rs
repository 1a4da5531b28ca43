use crate::codec::strict_encode;
use crate::config::BatchRpcConfig;

/// Default service origin.
pub const DEFAULT_BASE_URL: &str = "https://notebooklm.google.com";
/// Batch gateway path under the service origin.
pub const DEFAULT_GATEWAY_PATH: &str = "/_/LabsTailwindUi/data/batchexecute";
/// Streamed conversational query path under the service origin.
pub const DEFAULT_STREAM_PATH: &str = "/_/LabsTailwindUi/data/google.internal.labs.tailwind.orchestration.v1.LabsTailwindOrchestrationService/GenerateFreeFormStreamed";
/// Backend build label; opaque and safe to override.
pub const DEFAULT_BUILD_LABEL: &str = "boq_labs-tailwind-frontend_20250129.00_p0";
pub const DEFAULT_LOCALE: &str = "en";
/// Routing hint sent when a call does not name one.
pub const DEFAULT_SOURCE_PATH: &str = "/";

/// Trims whitespace and trailing slashes; an empty input selects the default origin.
pub fn normalize_base_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        input.trim()
    };
    base.trim_end_matches('/').to_owned()
}

/// `<base><gateway>?rpcids=..&source-path=..&bl=..&hl=..&rt=c[&f.sid=..]`.
pub fn batch_execute_url(
    config: &BatchRpcConfig,
    rpc_id: &str,
    source_path: Option<&str>,
    session_id: Option<&str>,
) -> String {
    let mut query = vec![
        ("rpcids", rpc_id),
        ("source-path", source_path.unwrap_or(DEFAULT_SOURCE_PATH)),
        ("bl", config.build_label.as_str()),
        ("hl", config.locale.as_str()),
        ("rt", "c"),
    ];
    if let Some(session_id) = session_id {
        query.push(("f.sid", session_id));
    }
    endpoint_url(config, &config.gateway_path, &query)
}

/// `<base><stream path>?bl=..&hl=..&_reqid=..&rt=c[&f.sid=..]`.
pub fn stream_query_url(config: &BatchRpcConfig, req_id: u64, session_id: Option<&str>) -> String {
    let req_id = req_id.to_string();
    let mut query = vec![
        ("bl", config.build_label.as_str()),
        ("hl", config.locale.as_str()),
        ("_reqid", req_id.as_str()),
        ("rt", "c"),
    ];
    if let Some(session_id) = session_id {
        query.push(("f.sid", session_id));
    }
    endpoint_url(config, &config.stream_path, &query)
}

fn endpoint_url(config: &BatchRpcConfig, path: &str, query: &[(&str, &str)]) -> String {
    let base = normalize_base_url(&config.base_url);
    let path = if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    };
    let query = query
        .iter()
        .map(|(key, value)| format!("{key}={}", strict_encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{base}{path}?{query}")
}
