#![allow(dead_code)]

pub mod config;
pub mod mock_gemini;
pub mod server;

/// Test credential sent as the bearer token
pub const API_KEY: &str = "AIza-test-key";

/// Parse SSE `data:` payloads from raw response text
pub fn parse_sse_data(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| line.starts_with("data: "))
        .map(|line| line.trim_start_matches("data: ").to_owned())
        .collect()
}

/// JSON chunks of an SSE body, excluding the terminal sentinel
pub fn sse_chunks(text: &str) -> Vec<serde_json::Value> {
    parse_sse_data(text)
        .iter()
        .filter(|data| data.as_str() != "[DONE]")
        .map(|data| serde_json::from_str(data).expect("chunk is JSON"))
        .collect()
}

/// Concatenated `delta.content` of every chunk
pub fn streamed_text(chunks: &[serde_json::Value]) -> String {
    chunks
        .iter()
        .filter_map(|chunk| chunk["choices"][0]["delta"]["content"].as_str())
        .collect()
}

/// Every non-null `finish_reason` in order
pub fn finish_reasons(chunks: &[serde_json::Value]) -> Vec<String> {
    chunks
        .iter()
        .filter_map(|chunk| chunk["choices"][0]["finish_reason"].as_str())
        .map(str::to_owned)
        .collect()
}
