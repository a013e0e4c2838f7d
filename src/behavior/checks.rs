//! Payload-integrity checks for the three check routes.

use hyper::header::CONTENT_TYPE;
use hyper::{HeaderMap, Method};
use serde_json::Value;

use crate::behavior::Fixtures;

pub const OCTET_STREAM: &str = "application/octet-stream";
pub const TEXT_PLAIN: &str = "text/plain";
pub const APPLICATION_JSON: &str = "application/json";

/// POST, compared without regard to case.
pub fn is_post(method: &Method) -> bool {
    method.as_str().eq_ignore_ascii_case("POST")
}

/// The `Content-Type` header must equal `expected` exactly.
pub fn has_content_type(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(CONTENT_TYPE)
        .is_some_and(|value| value.as_bytes() == expected.as_bytes())
}

/// `/checkpattern`: method, header and bytes as one condition.
pub fn check_pattern(method: &Method, headers: &HeaderMap, body: &[u8], fixtures: &Fixtures) -> bool {
    is_post(method) && has_content_type(headers, OCTET_STREAM) && body == &fixtures.pattern()[..]
}

/// `/checkstring`: method, header and bytes as one condition.
pub fn check_string(method: &Method, headers: &HeaderMap, body: &[u8], fixtures: &Fixtures) -> bool {
    is_post(method) && has_content_type(headers, TEXT_PLAIN) && body == &fixtures.string()[..]
}

/// Reason a `/checkjson` request was refused. The message is sent to the client.
#[derive(Debug, thiserror::Error)]
pub enum JsonRejection {
    #[error("Method must be POST")]
    Method,

    #[error("Content-Type must be application/json")]
    ContentType,

    #[error("Body is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("JSON does not match the expected document")]
    Mismatch,
}

/// `/checkjson`: method, then header, then parse, then deep equality.
pub fn check_json(
    method: &Method,
    headers: &HeaderMap,
    body: &[u8],
    fixtures: &Fixtures,
) -> Result<(), JsonRejection> {
    if !is_post(method) {
        return Err(JsonRejection::Method);
    }
    if !has_content_type(headers, APPLICATION_JSON) {
        return Err(JsonRejection::ContentType);
    }
    let parsed: Value = serde_json::from_slice(body)?;
    // Object equality ignores key order.
    if &parsed != fixtures.json() {
        return Err(JsonRejection::Mismatch);
    }
    Ok(())
}
