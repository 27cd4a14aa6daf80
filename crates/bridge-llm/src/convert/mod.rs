//! Translation between the `OpenAI` surface and the Gemini wire format

pub mod content;
pub mod embedding;
pub mod request;
pub mod response;
pub mod schema;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in seconds
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Outward finish reason for a backend finish reason
pub(crate) fn finish_reason(backend: &str) -> &'static str {
    match backend {
        "MAX_TOKENS" => "length",
        "SAFETY" | "RECITATION" => "content_filter",
        _ => "stop",
    }
}
