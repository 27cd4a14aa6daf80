//! Axum route handlers for the OpenAI-compatible surface

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderName, HeaderValue, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json, Router, routing};
use bridge_config::{BackendConfig, ModelsConfig, StreamingConfig};
use bridge_core::RequestContext;
use bridge_telemetry::BridgeMetrics;
use futures_util::StreamExt;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::convert::{self, content, embedding, response};
use crate::discovery::ModelCatalog;
use crate::error::{LlmError, map_error};
use crate::image::ImageResolver;
use crate::protocol::openai::{OpenAiEmbeddingRequest, OpenAiModel, OpenAiModelList, OpenAiRequest};
use crate::provider::Backend;
use crate::provider::gemini::GeminiBackend;
use crate::routing::{ModelRouter, is_embedding_model};
use crate::stream::{self, StreamTranslator};

/// Shared state for the route handlers
#[derive(Clone)]
pub struct LlmState {
    inner: Arc<LlmStateInner>,
}

struct LlmStateInner {
    router: ModelRouter,
    catalog: ModelCatalog,
    backend: Arc<dyn Backend>,
    images: ImageResolver,
    streaming: StreamingConfig,
    metrics: BridgeMetrics,
    /// Cancelled on server shutdown; in-flight streams end with a cancelled chunk
    shutdown: CancellationToken,
}

impl LlmState {
    /// Build state around the Gemini HTTP backend
    pub fn from_config(
        backend: &BackendConfig,
        models: &ModelsConfig,
        streaming: StreamingConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, LlmError> {
        let gemini = GeminiBackend::new(backend)?;
        let images = ImageResolver::new(gemini.client().clone(), backend.image_timeout);

        Ok(Self::new(Arc::new(gemini), images, models, streaming, shutdown))
    }

    pub fn new(
        backend: Arc<dyn Backend>,
        images: ImageResolver,
        models: &ModelsConfig,
        streaming: StreamingConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(LlmStateInner {
                router: ModelRouter::new(models),
                catalog: ModelCatalog::new(Arc::clone(&backend)),
                backend,
                images,
                streaming,
                metrics: BridgeMetrics::new(),
                shutdown,
            }),
        }
    }

    async fn known_models(&self, credential: &SecretString) -> Arc<Vec<String>> {
        self.inner.catalog.ensure_loaded(credential).await
    }
}

/// Build the router with all `OpenAI`-compatible endpoints
pub fn llm_router(state: LlmState) -> Router {
    Router::new()
        .route("/v1/chat/completions", routing::post(chat_completions))
        .route("/v1/embeddings", routing::post(embeddings))
        .route("/v1/models", routing::get(list_models))
        .route("/v1/models/{model}", routing::get(retrieve_model))
        .with_state(state)
}

/// Handle `POST /v1/chat/completions`
async fn chat_completions(
    State(state): State<LlmState>,
    Extension(context): Extension<RequestContext>,
    body: Bytes,
) -> Response {
    let start = Instant::now();

    match chat(&state, &context, &body).await {
        Ok((model, response)) => {
            state.inner.metrics.record_request("chat", &model, true, start);
            response
        }
        Err(e) => {
            state.inner.metrics.record_request("chat", "unknown", false, start);
            error_to_openai_response(&state, &e)
        }
    }
}

async fn chat(state: &LlmState, context: &RequestContext, body: &[u8]) -> Result<(String, Response), LlmError> {
    let request: OpenAiRequest = parse_body(body)?;
    let credential = context.credential.as_ref().ok_or(LlmError::MissingCredential)?;

    let known = state.known_models(credential).await;
    let backend_model = state.inner.router.resolve_chat(&request.model, &known);

    if is_embedding_model(&backend_model) {
        return Err(LlmError::Unsupported(format!(
            "model '{}' only supports embeddings",
            request.model
        )));
    }

    let conversation = content::convert_messages(&request.messages, &state.inner.images).await?;
    let call = convert::request::build(&request, &backend_model, conversation)?;
    let model = state.inner.router.unresolve(&backend_model);

    tracing::debug!(
        requested = %request.model,
        backend = %backend_model,
        stream = call.stream,
        "forwarding chat completion"
    );

    if !call.stream {
        let generated = state.inner.backend.generate(&call, credential).await?;
        let completion = response::translate(generated, &model);
        return Ok((model, Json(completion).into_response()));
    }

    // failures before the first frame still get a regular JSON error
    let upstream = state.inner.backend.stream_generate(&call, credential).await?;

    let translator = StreamTranslator::new(
        response::completion_id(),
        model.clone(),
        state.inner.streaming.char_budget,
        request.include_usage(),
    );
    let frames = stream::spawn(
        translator,
        upstream,
        state.inner.streaming.channel_capacity,
        state.inner.shutdown.clone(),
        state.inner.metrics.clone(),
    );

    let events = frames.map(|frame| Ok::<_, Infallible>(Event::default().data(frame.data())));
    let sse = Sse::new(events).keep_alive(KeepAlive::default());

    Ok((model, (streaming_headers(), sse).into_response()))
}

/// Headers that stop intermediaries from caching or buffering the stream
fn streaming_headers() -> [(HeaderName, HeaderValue); 3] {
    [
        (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        (header::CONNECTION, HeaderValue::from_static("keep-alive")),
        (HeaderName::from_static("x-accel-buffering"), HeaderValue::from_static("no")),
    ]
}

/// Handle `POST /v1/embeddings`
async fn embeddings(
    State(state): State<LlmState>,
    Extension(context): Extension<RequestContext>,
    body: Bytes,
) -> Response {
    let start = Instant::now();

    match embed(&state, &context, &body).await {
        Ok((model, response)) => {
            state.inner.metrics.record_request("embeddings", &model, true, start);
            response
        }
        Err(e) => {
            state.inner.metrics.record_request("embeddings", "unknown", false, start);
            error_to_openai_response(&state, &e)
        }
    }
}

async fn embed(state: &LlmState, context: &RequestContext, body: &[u8]) -> Result<(String, Response), LlmError> {
    let request: OpenAiEmbeddingRequest = parse_body(body)?;
    let credential = context.credential.as_ref().ok_or(LlmError::MissingCredential)?;

    let known = state.known_models(credential).await;
    let backend_model = state.inner.router.resolve_embedding(&request.model, &known);

    if !is_embedding_model(&backend_model) {
        return Err(LlmError::Unsupported(format!(
            "model '{}' does not support embeddings",
            request.model
        )));
    }

    let batch = embedding::build(request.input, &backend_model)?;
    let model_path = format!("models/{backend_model}");
    let embedded = state.inner.backend.batch_embed(&model_path, &batch, credential).await?;

    let model = state.inner.router.unresolve(&backend_model);
    let response = embedding::translate(embedded, &model);

    Ok((model, Json(response).into_response()))
}

/// Handle `GET /v1/models`
async fn list_models(State(state): State<LlmState>, Extension(context): Extension<RequestContext>) -> Response {
    Json(OpenAiModelList {
        object: "list".to_owned(),
        data: model_entries(&state, &context).await,
    })
    .into_response()
}

/// Handle `GET /v1/models/{model}`
async fn retrieve_model(
    State(state): State<LlmState>,
    Extension(context): Extension<RequestContext>,
    Path(model): Path<String>,
) -> Response {
    match model_entries(&state, &context)
        .await
        .into_iter()
        .find(|entry| entry.id == model)
    {
        Some(entry) => Json(entry).into_response(),
        None => error_to_openai_response(&state, &LlmError::ModelNotFound { model }),
    }
}

/// Listed models; discovery runs only when the caller supplied a credential
async fn model_entries(state: &LlmState, context: &RequestContext) -> Vec<OpenAiModel> {
    let known = match &context.credential {
        Some(credential) => state.known_models(credential).await,
        None => state.inner.catalog.snapshot().await,
    };

    let created = convert::unix_now();
    let owner = state.inner.router.owner();

    state
        .inner
        .router
        .listing(&known)
        .into_iter()
        .map(|id| OpenAiModel {
            id,
            object: "model".to_owned(),
            created,
            owned_by: owner.to_owned(),
        })
        .collect()
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, LlmError> {
    serde_json::from_slice(body).map_err(|e| LlmError::InvalidRequest(format!("invalid request body: {e}")))
}

/// Convert an error to an `OpenAI`-style JSON error response
fn error_to_openai_response(state: &LlmState, error: &LlmError) -> Response {
    let (status, body) = map_error(error);

    if status.is_server_error() {
        tracing::error!(error = %error, status = status.as_u16(), "request failed");
    } else {
        tracing::debug!(error = %error, status = status.as_u16(), "request rejected");
    }

    if matches!(error, LlmError::Backend { .. } | LlmError::Transport(_)) {
        state.inner.metrics.record_backend_error(error.kind());
    }

    (status, Json(body)).into_response()
}
