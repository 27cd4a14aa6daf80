//! Google Generative Language API client

use std::time::Duration;

use async_trait::async_trait;
use bridge_config::BackendConfig;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use http::StatusCode;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use url::Url;

use super::{Backend, BackendStream};
use crate::convert::request::GenerateCall;
use crate::error::LlmError;
use crate::protocol::google::{
    GoogleBatchEmbedRequest, GoogleBatchEmbedResponse, GoogleErrorResponse, GoogleModelInfo, GoogleModelList,
    GoogleResponse,
};

/// Header carrying the caller's API key
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Upper bound on model list pages followed in one fetch
const MAX_MODEL_PAGES: usize = 20;

pub struct GeminiBackend {
    client: Client,
    base_url: Url,
    request_timeout: Duration,
    stream_idle_timeout: Duration,
}

impl GeminiBackend {
    /// Build a client from backend configuration
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Internal` if the HTTP client cannot be constructed
    pub fn new(config: &BackendConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| LlmError::Internal(anyhow::anyhow!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &BackendConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            request_timeout: config.request_timeout,
            stream_idle_timeout: config.stream_idle_timeout,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.as_str().trim_end_matches('/'))
    }

    fn authorized(builder: RequestBuilder, credential: &SecretString) -> RequestBuilder {
        builder.header(API_KEY_HEADER, credential.expose_secret())
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder, operation: &str) -> Result<T, LlmError> {
        let response = builder.timeout(self.request_timeout).send().await.map_err(|e| {
            tracing::error!(operation, error = %e, "backend request failed");
            LlmError::Transport(e.to_string())
        })?;

        let response = check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| LlmError::Transport(format!("failed to parse {operation} response: {e}")))
    }
}

#[async_trait]
impl Backend for GeminiBackend {
    async fn generate(&self, call: &GenerateCall, credential: &SecretString) -> Result<GoogleResponse, LlmError> {
        let url = self.endpoint(&format!("{}:generateContent", call.model_path));
        let builder = Self::authorized(self.client.post(&url), credential).json(&call.body);

        self.send_json(builder, "generateContent").await
    }

    async fn stream_generate(
        &self,
        call: &GenerateCall,
        credential: &SecretString,
    ) -> Result<BackendStream, LlmError> {
        let url = self.endpoint(&format!("{}:streamGenerateContent?alt=sse", call.model_path));

        // headers within request_timeout; after that frames may be slow but never silent
        let request = Self::authorized(self.client.post(&url), credential).json(&call.body);
        let response = tokio::time::timeout(self.request_timeout, async {
            let response = request.send().await.map_err(|e| {
                tracing::error!(error = %e, "backend stream request failed");
                LlmError::Transport(e.to_string())
            })?;
            check_status(response).await
        })
        .await
        .map_err(|_| {
            tracing::error!(timeout = ?self.request_timeout, "backend stream request timed out");
            LlmError::Transport(format!("backend did not respond within {:?}", self.request_timeout))
        })??;

        let frames = response.bytes_stream().eventsource().filter_map(|result| async move {
            match result {
                Ok(event) => parse_frame(event.data.trim()),
                Err(e) => Some(Err(LlmError::Streaming(e.to_string()))),
            }
        });

        let idle = self.stream_idle_timeout;
        let frames = futures_util::stream::unfold(Some(Box::pin(frames)), move |frames| async move {
            let mut frames = frames?;
            match tokio::time::timeout(idle, frames.next()).await {
                Ok(Some(frame)) => Some((frame, Some(frames))),
                Ok(None) => None,
                Err(_) => {
                    tracing::warn!(timeout = ?idle, "backend stream went idle");
                    Some((Err(LlmError::Streaming(format!("backend stream idle for {idle:?}"))), None))
                }
            }
        });

        Ok(Box::pin(frames))
    }

    async fn batch_embed(
        &self,
        model_path: &str,
        request: &GoogleBatchEmbedRequest,
        credential: &SecretString,
    ) -> Result<GoogleBatchEmbedResponse, LlmError> {
        let url = self.endpoint(&format!("{model_path}:batchEmbedContents"));
        let builder = Self::authorized(self.client.post(&url), credential).json(request);

        self.send_json(builder, "batchEmbedContents").await
    }

    async fn list_models(&self, credential: &SecretString) -> Result<Vec<GoogleModelInfo>, LlmError> {
        let url = self.endpoint("models");
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_MODEL_PAGES {
            let mut builder = Self::authorized(self.client.get(&url), credential).query(&[("pageSize", "1000")]);
            if let Some(token) = &page_token {
                builder = builder.query(&[("pageToken", token.as_str())]);
            }

            let page: GoogleModelList = self.send_json(builder, "models.list").await?;
            models.extend(page.models);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(models)
    }
}

/// Turn a non-success response into `LlmError::Backend`
async fn check_status(response: Response) -> Result<Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(status = %status, "backend returned error");

    Err(backend_error(status, &body))
}

fn backend_error(status: StatusCode, body: &str) -> LlmError {
    match serde_json::from_str::<GoogleErrorResponse>(body) {
        Ok(parsed) => LlmError::Backend {
            status,
            reason: parsed.error.status,
            message: parsed.error.message,
        },
        Err(_) => LlmError::Backend {
            status,
            reason: None,
            message: if body.is_empty() {
                status.canonical_reason().unwrap_or("backend error").to_owned()
            } else {
                body.to_owned()
            },
        },
    }
}

/// Parse one SSE data payload; empty keep-alive frames are skipped
fn parse_frame(data: &str) -> Option<Result<GoogleResponse, LlmError>> {
    if data.is_empty() {
        return None;
    }

    if let Ok(error) = serde_json::from_str::<GoogleErrorResponse>(data) {
        let status = StatusCode::from_u16(error.error.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return Some(Err(LlmError::Backend {
            status,
            reason: error.error.status,
            message: error.error.message,
        }));
    }

    Some(
        serde_json::from_str::<GoogleResponse>(data)
            .map_err(|e| LlmError::Streaming(format!("unparseable backend frame: {e}"))),
    )
}
