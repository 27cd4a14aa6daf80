//! Google Generative Language API wire format types

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

// -- Request types --

/// Google `generateContent` request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleRequest {
    /// Conversation history followed by the live prompt
    pub contents: Vec<GoogleContent>,
    /// Generation configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GoogleGenerationConfig>,
    /// Per-category safety thresholds
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub safety_settings: Vec<GoogleSafetySetting>,
    /// Tool definitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<GoogleTool>>,
    /// Tool configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<GoogleToolConfig>,
}

/// Google content object containing role and parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleContent {
    /// Role ("user" or "model")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Content parts; part kinds this gateway does not model are dropped
    #[serde(default, deserialize_with = "known_parts")]
    pub parts: Vec<GooglePart>,
}

impl GoogleContent {
    pub fn new(role: &str, parts: Vec<GooglePart>) -> Self {
        Self {
            role: Some(role.to_owned()),
            parts,
        }
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }
}

/// Individual part within a Google content object
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GooglePart {
    /// Text content
    Text(String),
    /// Inline data (e.g. images)
    InlineData(GoogleInlineData),
    /// Function call from the model
    FunctionCall(GoogleFunctionCall),
    /// Function response from the user
    FunctionResponse(GoogleFunctionResponse),
}

impl GooglePart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

/// Permissive view of a part used while reading backend responses
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPart {
    text: Option<String>,
    inline_data: Option<GoogleInlineData>,
    function_call: Option<GoogleFunctionCall>,
    function_response: Option<GoogleFunctionResponse>,
}

impl RawPart {
    fn into_part(self) -> Option<GooglePart> {
        if let Some(call) = self.function_call {
            Some(GooglePart::FunctionCall(call))
        } else if let Some(response) = self.function_response {
            Some(GooglePart::FunctionResponse(response))
        } else if let Some(data) = self.inline_data {
            Some(GooglePart::InlineData(data))
        } else {
            self.text.map(GooglePart::Text)
        }
    }
}

fn known_parts<'de, D>(deserializer: D) -> Result<Vec<GooglePart>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<RawPart>::deserialize(deserializer)?;
    Ok(raw.into_iter().filter_map(RawPart::into_part).collect())
}

/// Inline binary data (images, etc.)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleInlineData {
    /// MIME type (e.g. "image/png")
    pub mime_type: String,
    /// Base64-encoded data
    pub data: String,
}

/// Function call from the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleFunctionCall {
    /// Function name
    pub name: String,
    /// Function arguments as a JSON object
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Function response from the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleFunctionResponse {
    /// Function name
    pub name: String,
    /// Response content as a JSON object
    pub response: serde_json::Value,
}

/// Generation configuration parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleGenerationConfig {
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Maximum output tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    /// Number of candidates to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_count: Option<u32>,
    /// Output MIME type, `application/json` for JSON mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
}

/// Safety threshold for one harm category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleSafetySetting {
    pub category: String,
    pub threshold: String,
}

/// Google tool definition wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleTool {
    /// Function declarations
    pub function_declarations: Vec<GoogleFunctionDeclaration>,
}

/// Google function declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleFunctionDeclaration {
    /// Function name
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Typed parameter schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<GoogleSchema>,
}

/// Typed schema in the backend's OpenAPI subset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoogleSchema {
    #[serde(rename = "type")]
    pub schema_type: GoogleSchemaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<GoogleSchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, GoogleSchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

/// Schema type tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoogleSchemaType {
    #[default]
    #[serde(rename = "TYPE_UNSPECIFIED")]
    Unspecified,
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

/// Google tool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleToolConfig {
    /// Function calling config
    pub function_calling_config: GoogleFunctionCallingConfig,
}

/// Function calling configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleFunctionCallingConfig {
    /// Mode: "AUTO", "ANY", "NONE"
    pub mode: String,
    /// Allowed function names (when mode is "ANY")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_function_names: Option<Vec<String>>,
}

// -- Response types --

/// Google `generateContent` response, also one SSE frame of a stream
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleResponse {
    /// Generated candidates
    #[serde(default)]
    pub candidates: Vec<GoogleCandidate>,
    /// Token usage metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<GoogleUsageMetadata>,
    /// Set when the prompt itself was blocked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_feedback: Option<GooglePromptFeedback>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GooglePromptFeedback {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
}

/// Generated candidate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleCandidate {
    /// Generated content; absent when the candidate was blocked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<GoogleContent>,
    /// Finish reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// Candidate index
    #[serde(default)]
    pub index: u32,
}

impl GoogleCandidate {
    pub fn parts(&self) -> &[GooglePart] {
        self.content.as_ref().map_or(&[], |c| c.parts.as_slice())
    }
}

/// Token usage metadata
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleUsageMetadata {
    /// Prompt token count
    #[serde(default)]
    pub prompt_token_count: u32,
    /// Candidates token count
    #[serde(default)]
    pub candidates_token_count: u32,
    /// Total token count
    #[serde(default)]
    pub total_token_count: u32,
}

// -- Embedding types --

/// Google `batchEmbedContents` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleBatchEmbedRequest {
    pub requests: Vec<GoogleEmbedRequest>,
}

/// One text to embed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleEmbedRequest {
    /// Model path (`models/<name>`)
    pub model: String,
    pub content: GoogleContent,
}

/// Google `batchEmbedContents` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoogleBatchEmbedResponse {
    #[serde(default)]
    pub embeddings: Vec<GoogleEmbedding>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoogleEmbedding {
    #[serde(default)]
    pub values: Vec<f32>,
}

// -- Models list types --

/// Google models list response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleModelList {
    /// List of models
    #[serde(default)]
    pub models: Vec<GoogleModelInfo>,
    /// Pagination token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Google model info
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleModelInfo {
    /// Full model name (e.g. "models/gemini-pro")
    pub name: String,
    /// Display name
    #[serde(default)]
    pub display_name: Option<String>,
    /// Supported generation methods
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

// -- Error response --

/// Google error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleErrorResponse {
    /// Error details
    pub error: GoogleErrorDetail,
}

/// Google error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleErrorDetail {
    /// HTTP status code
    #[serde(default)]
    pub code: u16,
    /// Error message
    #[serde(default)]
    pub message: String,
    /// Error status string (e.g. `RESOURCE_EXHAUSTED`)
    #[serde(default)]
    pub status: Option<String>,
}
