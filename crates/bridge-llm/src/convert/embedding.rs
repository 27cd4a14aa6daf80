//! Embeddings request and response translation

use crate::error::LlmError;
use crate::protocol::google::{
    GoogleBatchEmbedRequest, GoogleBatchEmbedResponse, GoogleContent, GoogleEmbedRequest, GooglePart,
};
use crate::protocol::openai::{EmbeddingInput, OpenAiEmbedding, OpenAiEmbeddingResponse, OpenAiEmbeddingUsage};

/// One `batchEmbedContents` request covering every input, in order
pub fn build(input: EmbeddingInput, backend_model: &str) -> Result<GoogleBatchEmbedRequest, LlmError> {
    let texts = input.into_vec();
    if texts.is_empty() {
        return Err(LlmError::InvalidRequest("input must not be empty".to_owned()));
    }

    let model_path = format!("models/{backend_model}");

    Ok(GoogleBatchEmbedRequest {
        requests: texts
            .into_iter()
            .map(|text| GoogleEmbedRequest {
                model: model_path.clone(),
                content: GoogleContent {
                    role: None,
                    parts: vec![GooglePart::Text(text)],
                },
            })
            .collect(),
    })
}

pub fn translate(response: GoogleBatchEmbedResponse, model: &str) -> OpenAiEmbeddingResponse {
    let data = response
        .embeddings
        .into_iter()
        .zip(0u32..)
        .map(|(embedding, index)| OpenAiEmbedding {
            object: "embedding".to_owned(),
            embedding: embedding.values,
            index,
        })
        .collect();

    OpenAiEmbeddingResponse {
        object: "list".to_owned(),
        data,
        model: model.to_owned(),
        usage: OpenAiEmbeddingUsage::default(),
    }
}
