//! Chat messages to backend turns
//!
//! The backend requires strictly alternating user/model turns and has no
//! system role. The last message (or trailing run of tool results) is the
//! live prompt and is not part of the history.

use serde_json::{Map, Value};

use crate::error::LlmError;
use crate::image::ImageResolver;
use crate::protocol::google::{GoogleContent, GoogleFunctionCall, GoogleFunctionResponse, GooglePart};
use crate::protocol::openai::{OpenAiContent, OpenAiContentPart, OpenAiMessage, OpenAiToolCall};

pub const ROLE_USER: &str = "user";
pub const ROLE_MODEL: &str = "model";

/// Converted conversation: alternating history plus the live prompt
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub history: Vec<GoogleContent>,
    pub prompt: GoogleContent,
}

impl Conversation {
    /// History followed by the prompt, as sent in `contents`
    pub fn into_contents(self) -> Vec<GoogleContent> {
        let mut contents = self.history;
        contents.push(self.prompt);
        contents
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnKind {
    User,
    Model,
    ToolResult,
}

impl TurnKind {
    const fn role(self) -> &'static str {
        match self {
            Self::User | Self::ToolResult => ROLE_USER,
            Self::Model => ROLE_MODEL,
        }
    }
}

/// Accumulates history turns while keeping roles alternating
#[derive(Default)]
struct History {
    turns: Vec<GoogleContent>,
    last: Option<TurnKind>,
}

impl History {
    fn push(&mut self, kind: TurnKind, parts: Vec<GooglePart>) {
        match self.last {
            Some(TurnKind::ToolResult) if kind == TurnKind::ToolResult => {
                if let Some(turn) = self.turns.last_mut() {
                    turn.parts.extend(parts);
                }
                return;
            }
            Some(last) if last.role() == kind.role() => {
                let filler = if kind.role() == ROLE_USER { ROLE_MODEL } else { ROLE_USER };
                self.turns.push(filler_turn(filler));
            }
            _ => {}
        }

        self.turns.push(GoogleContent::new(kind.role(), parts));
        self.last = Some(kind);
    }

    fn push_filler(&mut self, role: &str) {
        self.turns.push(filler_turn(role));
        self.last = Some(if role == ROLE_MODEL { TurnKind::Model } else { TurnKind::User });
    }

    fn ends_with_model(&self) -> bool {
        self.last == Some(TurnKind::Model)
    }
}

fn filler_turn(role: &str) -> GoogleContent {
    GoogleContent::new(role, vec![GooglePart::text("")])
}

/// Convert the message list into backend history and prompt
///
/// Images are resolved here, so a failed fetch aborts the whole request
/// before anything reaches the backend.
pub async fn convert_messages(messages: &[OpenAiMessage], images: &ImageResolver) -> Result<Conversation, LlmError> {
    let Some(last) = messages.last() else {
        return Err(LlmError::InvalidRequest("messages must contain at least one message".to_owned()));
    };

    // parallel tool results answering one model turn travel together
    let prompt_start = if last.role == "tool" {
        messages.iter().rposition(|m| m.role != "tool").map_or(0, |i| i + 1)
    } else {
        messages.len() - 1
    };

    let mut history = History::default();

    for message in &messages[..prompt_start] {
        let parts = non_empty(message_parts(message, images).await?);

        match message.role.as_str() {
            "system" => {
                history.push(TurnKind::User, parts);
                history.push_filler(ROLE_MODEL);
            }
            "user" => history.push(TurnKind::User, parts),
            "assistant" => history.push(TurnKind::Model, parts),
            "tool" => history.push(TurnKind::ToolResult, parts),
            other => return Err(unknown_role(other)),
        }
    }

    if !history.turns.is_empty() && !history.ends_with_model() {
        history.push_filler(ROLE_MODEL);
    }

    let mut prompt_parts = Vec::new();
    for message in &messages[prompt_start..] {
        prompt_parts.extend(message_parts(message, images).await?);
    }

    if prompt_parts.is_empty() {
        return Err(LlmError::InvalidRequest("the last message has no content".to_owned()));
    }

    Ok(Conversation {
        history: history.turns,
        prompt: GoogleContent::new(ROLE_USER, prompt_parts),
    })
}

fn unknown_role(role: &str) -> LlmError {
    LlmError::InvalidRequest(format!(
        "unsupported message role '{role}', expected system, user, assistant or tool"
    ))
}

/// Parts for a single message, possibly none
async fn message_parts(message: &OpenAiMessage, images: &ImageResolver) -> Result<Vec<GooglePart>, LlmError> {
    match message.role.as_str() {
        "system" | "user" => content_parts(message.content.as_ref(), images).await,
        "assistant" => {
            let mut parts = content_parts(message.content.as_ref(), images).await?;
            for call in message.tool_calls.iter().flatten() {
                parts.push(function_call_part(call)?);
            }
            Ok(parts)
        }
        "tool" => Ok(vec![function_response_part(message)?]),
        other => Err(unknown_role(other)),
    }
}

/// History turns always carry at least one part
fn non_empty(parts: Vec<GooglePart>) -> Vec<GooglePart> {
    if parts.is_empty() { vec![GooglePart::text("")] } else { parts }
}

async fn content_parts(content: Option<&OpenAiContent>, images: &ImageResolver) -> Result<Vec<GooglePart>, LlmError> {
    match content {
        None => Ok(Vec::new()),
        Some(OpenAiContent::Text(text)) if text.is_empty() => Ok(Vec::new()),
        Some(OpenAiContent::Text(text)) => Ok(vec![GooglePart::text(text.clone())]),
        Some(OpenAiContent::Parts(parts)) => {
            let mut converted = Vec::with_capacity(parts.len());
            for part in parts {
                match part {
                    OpenAiContentPart::Text { text } => converted.push(GooglePart::text(text.clone())),
                    OpenAiContentPart::ImageUrl { image_url } => {
                        let image = images.resolve(&image_url.url).await?;
                        converted.push(GooglePart::InlineData(image.into_inline()));
                    }
                }
            }
            Ok(converted)
        }
    }
}

fn function_call_part(call: &OpenAiToolCall) -> Result<GooglePart, LlmError> {
    let raw = call.function.arguments.trim();

    let args = if raw.is_empty() {
        Value::Object(Map::new())
    } else {
        match serde_json::from_str::<Value>(raw) {
            Ok(value @ Value::Object(_)) => value,
            Ok(_) => {
                return Err(LlmError::InvalidRequest(format!(
                    "arguments of tool call '{}' must be a JSON object",
                    call.id
                )));
            }
            Err(e) => {
                return Err(LlmError::InvalidRequest(format!(
                    "arguments of tool call '{}' are not valid JSON: {e}",
                    call.id
                )));
            }
        }
    };

    Ok(GooglePart::FunctionCall(GoogleFunctionCall {
        name: call.function.name.clone(),
        args,
    }))
}

fn function_response_part(message: &OpenAiMessage) -> Result<GooglePart, LlmError> {
    let call_id = message
        .tool_call_id
        .as_deref()
        .ok_or_else(|| LlmError::InvalidRequest("tool messages require tool_call_id".to_owned()))?;

    let name = function_name(call_id)?;
    let text = message.content.as_ref().map(OpenAiContent::as_text).unwrap_or_default();

    let response = match serde_json::from_str::<Value>(&text) {
        Ok(value @ Value::Object(_)) => value,
        _ => serde_json::json!({ "content": text }),
    };

    Ok(GooglePart::FunctionResponse(GoogleFunctionResponse {
        name: name.to_owned(),
        response,
    }))
}

/// Recover the function name from a `<name>-<index>` call id
pub fn function_name(call_id: &str) -> Result<&str, LlmError> {
    call_id
        .rsplit_once('-')
        .filter(|(name, index)| !name.is_empty() && !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
        .map(|(name, _)| name)
        .ok_or_else(|| {
            LlmError::InvalidRequest(format!(
                "tool_call_id '{call_id}' does not match the '<function>-<index>' format"
            ))
        })
}
