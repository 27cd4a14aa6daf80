//! Inbound chat request to backend generation call

use serde_json::Value;

use super::content::Conversation;
use super::schema;
use crate::error::LlmError;
use crate::protocol::google::{
    GoogleFunctionCallingConfig, GoogleFunctionDeclaration, GoogleGenerationConfig, GoogleRequest,
    GoogleSafetySetting, GoogleTool, GoogleToolConfig,
};
use crate::protocol::openai::{OpenAiRequest, OpenAiTool};

/// Harm categories relaxed on every request; filtering is the caller's concern
const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

const BLOCK_NONE: &str = "BLOCK_NONE";

/// A fully-formed backend call, built without any I/O
#[derive(Debug, Clone)]
pub struct GenerateCall {
    /// Backend model name without prefix
    pub model: String,
    /// `models/<name>`
    pub model_path: String,
    pub body: GoogleRequest,
    pub stream: bool,
}

/// How the model may use the declared tools
#[derive(Debug, Clone, PartialEq, Eq)]
enum ToolChoice {
    None,
    Auto,
    Required,
    Function(String),
}

impl ToolChoice {
    fn parse(value: &Value) -> Result<Self, LlmError> {
        match value {
            Value::String(mode) => match mode.as_str() {
                "none" => Ok(Self::None),
                "auto" => Ok(Self::Auto),
                "required" => Ok(Self::Required),
                other => Err(LlmError::InvalidRequest(format!("unsupported tool_choice '{other}'"))),
            },
            Value::Object(_) => value
                .pointer("/function/name")
                .and_then(Value::as_str)
                .map(|name| Self::Function(name.to_owned()))
                .ok_or_else(|| LlmError::InvalidRequest("tool_choice object requires function.name".to_owned())),
            _ => Err(LlmError::InvalidRequest(
                "tool_choice must be a string or an object".to_owned(),
            )),
        }
    }

    fn into_config(self) -> GoogleToolConfig {
        let (mode, allowed_function_names) = match self {
            Self::None => ("NONE", None),
            Self::Auto => ("AUTO", None),
            Self::Required => ("ANY", None),
            Self::Function(name) => ("ANY", Some(vec![name])),
        };

        GoogleToolConfig {
            function_calling_config: GoogleFunctionCallingConfig {
                mode: mode.to_owned(),
                allowed_function_names,
            },
        }
    }
}

/// Assemble the backend call for an already-converted conversation
pub fn build(request: &OpenAiRequest, backend_model: &str, conversation: Conversation) -> Result<GenerateCall, LlmError> {
    let tools = request.tools.as_deref().filter(|tools| !tools.is_empty());

    let tool_config = match (tools, &request.tool_choice) {
        (Some(_), Some(choice)) => Some(ToolChoice::parse(choice)?.into_config()),
        _ => None,
    };

    let body = GoogleRequest {
        contents: conversation.into_contents(),
        generation_config: generation_config(request),
        safety_settings: safety_settings(),
        tools: tools.map(declarations).transpose()?,
        tool_config,
    };

    Ok(GenerateCall {
        model: backend_model.to_owned(),
        model_path: format!("models/{backend_model}"),
        body,
        stream: request.is_stream(),
    })
}

/// Only parameters that are set and non-zero reach the backend
fn generation_config(request: &OpenAiRequest) -> Option<GoogleGenerationConfig> {
    let stop_sequences = request
        .stop
        .clone()
        .map(|stop| stop.into_vec().into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>())
        .filter(|stop| !stop.is_empty());

    let response_mime_type = request
        .response_format
        .as_ref()
        .filter(|format| matches!(format.format_type.as_str(), "json_object" | "json_schema" | "json"))
        .map(|_| "application/json".to_owned());

    let config = GoogleGenerationConfig {
        temperature: request.temperature.filter(|t| *t > 0.0),
        top_p: request.top_p.filter(|p| *p > 0.0),
        max_output_tokens: request.max_tokens.filter(|m| *m > 0),
        stop_sequences,
        candidate_count: request.n.filter(|n| *n > 1),
        response_mime_type,
    };

    (config != GoogleGenerationConfig::default()).then_some(config)
}

fn safety_settings() -> Vec<GoogleSafetySetting> {
    HARM_CATEGORIES
        .iter()
        .map(|category| GoogleSafetySetting {
            category: (*category).to_owned(),
            threshold: BLOCK_NONE.to_owned(),
        })
        .collect()
}

fn declarations(tools: &[OpenAiTool]) -> Result<Vec<GoogleTool>, LlmError> {
    let function_declarations = tools
        .iter()
        .map(|tool| {
            if tool.tool_type != "function" {
                return Err(LlmError::InvalidRequest(format!(
                    "unsupported tool type '{}'",
                    tool.tool_type
                )));
            }

            Ok(GoogleFunctionDeclaration {
                name: tool.function.name.clone(),
                description: tool.function.description.clone(),
                parameters: schema::function_parameters(tool.function.parameters.as_ref()),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(vec![GoogleTool { function_declarations }])
}
