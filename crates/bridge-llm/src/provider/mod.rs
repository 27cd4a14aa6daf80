//! Backend seam: the generative-content API the gateway forwards to

pub mod gemini;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use secrecy::SecretString;

use crate::convert::request::GenerateCall;
use crate::error::LlmError;
use crate::protocol::google::{GoogleBatchEmbedRequest, GoogleBatchEmbedResponse, GoogleModelInfo, GoogleResponse};

/// Incremental backend responses, one per SSE frame
pub type BackendStream = Pin<Box<dyn Stream<Item = Result<GoogleResponse, LlmError>> + Send>>;

/// Operations the gateway needs from the backend
///
/// Every call carries the caller's credential; the backend holds none of its own.
#[async_trait]
pub trait Backend: Send + Sync {
    /// `generateContent`
    async fn generate(&self, call: &GenerateCall, credential: &SecretString) -> Result<GoogleResponse, LlmError>;

    /// `streamGenerateContent`; errors before the first frame are returned directly
    async fn stream_generate(&self, call: &GenerateCall, credential: &SecretString)
    -> Result<BackendStream, LlmError>;

    /// `batchEmbedContents` for the model path `models/<name>`
    async fn batch_embed(
        &self,
        model_path: &str,
        request: &GoogleBatchEmbedRequest,
        credential: &SecretString,
    ) -> Result<GoogleBatchEmbedResponse, LlmError>;

    /// All models visible to the credential, following pagination
    async fn list_models(&self, credential: &SecretString) -> Result<Vec<GoogleModelInfo>, LlmError>;
}
