//! Mock Gemini backend for integration tests
//!
//! Serves the handful of Generative Language endpoints the gateway calls and
//! records every request so tests can assert on the translated payloads.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// One request received by the mock
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Path segment after `models/`, e.g. `gemini-1.5-flash-002:generateContent`
    pub call: String,
    /// Value of the `x-goog-api-key` header
    pub api_key: Option<String>,
    pub body: Value,
}

/// Builder for a mock backend
#[derive(Default)]
pub struct MockGeminiBuilder {
    models: Option<Vec<String>>,
    text: Option<String>,
    generate_response: Option<Value>,
    stream_frames: Option<Vec<Value>>,
    fail_status: Option<u16>,
}

impl MockGeminiBuilder {
    /// Models returned by the list endpoint
    pub fn models(mut self, models: &[&str]) -> Self {
        self.models = Some(models.iter().map(|m| (*m).to_owned()).collect());
        self
    }

    /// Text of the canned non-streaming answer
    pub fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_owned());
        self
    }

    /// Full `generateContent` response body
    pub fn generate_response(mut self, response: Value) -> Self {
        self.generate_response = Some(response);
        self
    }

    /// SSE payloads returned by `streamGenerateContent`
    pub fn stream_frames(mut self, frames: Vec<Value>) -> Self {
        self.stream_frames = Some(frames);
        self
    }

    /// Fail every generation and embedding call with this status
    pub fn failing(mut self, status: u16) -> Self {
        self.fail_status = Some(status);
        self
    }

    pub async fn start(self) -> anyhow::Result<MockGemini> {
        let text = self.text.unwrap_or_else(|| "Hello from Gemini".to_owned());

        let state = Arc::new(MockState {
            models: self.models.unwrap_or_else(|| {
                [
                    "gemini-1.5-pro-latest",
                    "gemini-1.5-flash-002",
                    "gemini-2.0-flash-exp",
                    "text-embedding-004",
                ]
                .iter()
                .map(|m| (*m).to_owned())
                .collect()
            }),
            generate_response: self.generate_response.unwrap_or_else(|| text_response(&text, "STOP")),
            stream_frames: self.stream_frames.unwrap_or_else(|| {
                vec![
                    text_frame("Hello "),
                    text_frame("from "),
                    finish_frame("Gemini", "STOP"),
                ]
            }),
            fail_status: self.fail_status,
            calls: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1beta/models", routing::get(list_models))
            .route("/v1beta/models/{call}", routing::post(model_call))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(MockGemini { addr, shutdown, state })
    }
}

/// Running mock backend
pub struct MockGemini {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

struct MockState {
    models: Vec<String>,
    generate_response: Value,
    stream_frames: Vec<Value>,
    fail_status: Option<u16>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockGemini {
    pub fn builder() -> MockGeminiBuilder {
        MockGeminiBuilder::default()
    }

    /// Start with canned defaults
    pub async fn start() -> anyhow::Result<Self> {
        Self::builder().start().await
    }

    /// Base URL including the API version segment
    pub fn base_url(&self) -> String {
        format!("http://{}/v1beta", self.addr)
    }

    /// Generation and embedding calls received so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().expect("lock").clone()
    }

    /// The most recent generation or embedding call
    pub fn last_call(&self) -> RecordedCall {
        self.calls().pop().expect("at least one backend call")
    }
}

impl Drop for MockGemini {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// One streamed increment carrying text
pub fn text_frame(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "index": 0
        }]
    })
}

/// Final increment carrying text, a finish reason and usage
pub fn finish_frame(text: &str, reason: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": reason,
            "index": 0
        }],
        "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 3, "totalTokenCount": 7}
    })
}

/// Complete non-streaming response
pub fn text_response(text: &str, reason: &str) -> Value {
    finish_frame(text, reason)
}

/// Google-shaped error body
pub fn error_body(code: u16) -> Value {
    let status = match code {
        429 => "RESOURCE_EXHAUSTED",
        400 => "INVALID_ARGUMENT",
        403 => "PERMISSION_DENIED",
        _ => "INTERNAL",
    };

    json!({"error": {"code": code, "message": format!("mock failure {code}"), "status": status}})
}

async fn list_models(State(state): State<Arc<MockState>>) -> Json<Value> {
    let models: Vec<Value> = state
        .models
        .iter()
        .map(|name| {
            let methods = if name.contains("embedding") {
                json!(["embedContent", "batchEmbedContents"])
            } else {
                json!(["generateContent", "streamGenerateContent"])
            };
            json!({"name": format!("models/{name}"), "supportedGenerationMethods": methods})
        })
        .collect();

    Json(json!({"models": models}))
}

async fn model_call(
    State(state): State<Arc<MockState>>,
    Path(call): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let api_key = headers
        .get("x-goog-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let requests = body["requests"].as_array().map_or(0, Vec::len);

    state.calls.lock().expect("lock").push(RecordedCall {
        call: call.clone(),
        api_key,
        body,
    });

    if let Some(code) = state.fail_status {
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, Json(error_body(code))).into_response();
    }

    if call.ends_with(":streamGenerateContent") {
        let body: String = state
            .stream_frames
            .iter()
            .map(|frame| format!("data: {frame}\r\n\r\n"))
            .collect();

        return ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response();
    }

    if call.ends_with(":batchEmbedContents") {
        let embeddings: Vec<Value> = (0..requests)
            .map(|i| json!({"values": [0.1, 0.2, f64::from(u32::try_from(i).unwrap_or(0))]}))
            .collect();
        return Json(json!({"embeddings": embeddings})).into_response();
    }

    if call.ends_with(":generateContent") {
        return Json(state.generate_response.clone()).into_response();
    }

    (StatusCode::NOT_FOUND, Json(error_body(404))).into_response()
}
