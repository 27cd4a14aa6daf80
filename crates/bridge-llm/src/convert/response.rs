//! Complete backend response to `OpenAI` chat completion

use bridge_core::new_id;

use super::{finish_reason, unix_now};
use crate::protocol::google::{GoogleCandidate, GooglePart, GoogleResponse, GoogleUsageMetadata};
use crate::protocol::openai::{
    OpenAiChoice, OpenAiChoiceMessage, OpenAiFunctionCall, OpenAiResponse, OpenAiToolCall, OpenAiUsage,
};

/// Outward response id, shared by every chunk of a stream
pub fn completion_id() -> String {
    format!("chatcmpl-{}", new_id())
}

/// Translate a non-streaming backend response
///
/// `model` is the outward model name reported to the client.
pub fn translate(response: GoogleResponse, model: &str) -> OpenAiResponse {
    let mut choices: Vec<OpenAiChoice> = response.candidates.iter().map(translate_candidate).collect();

    if choices.is_empty() {
        // the prompt was blocked or nothing was generated
        let blocked = response
            .prompt_feedback
            .as_ref()
            .is_some_and(|feedback| feedback.block_reason.is_some());

        choices.push(OpenAiChoice {
            index: 0,
            message: OpenAiChoiceMessage {
                role: "assistant".to_owned(),
                content: Some(String::new()),
                tool_calls: None,
            },
            finish_reason: Some(if blocked { "content_filter" } else { "stop" }.to_owned()),
        });
    }

    OpenAiResponse {
        id: completion_id(),
        object: "chat.completion".to_owned(),
        created: unix_now(),
        model: model.to_owned(),
        choices,
        usage: response.usage_metadata.map(usage),
    }
}

fn translate_candidate(candidate: &GoogleCandidate) -> OpenAiChoice {
    let parts = candidate.parts();

    let text = parts.iter().find_map(|part| match part {
        GooglePart::Text(text) => Some(text.clone()),
        _ => None,
    });

    let tool_calls: Vec<OpenAiToolCall> = parts
        .iter()
        .enumerate()
        .filter_map(|(index, part)| match part {
            GooglePart::FunctionCall(call) => Some(tool_call(&call.name, &call.args, index)),
            _ => None,
        })
        .collect();

    let (message, reason) = if tool_calls.is_empty() {
        let reason = finish_reason(candidate.finish_reason.as_deref().unwrap_or_default());
        (
            OpenAiChoiceMessage {
                role: "assistant".to_owned(),
                content: Some(text.unwrap_or_default()),
                tool_calls: None,
            },
            reason,
        )
    } else {
        (
            OpenAiChoiceMessage {
                role: "assistant".to_owned(),
                content: None,
                tool_calls: Some(tool_calls),
            },
            "tool_calls",
        )
    };

    OpenAiChoice {
        index: candidate.index,
        message,
        finish_reason: Some(reason.to_owned()),
    }
}

/// Tool call with the `<name>-<index>` id that tool results refer back to
pub(crate) fn tool_call(name: &str, args: &serde_json::Value, index: usize) -> OpenAiToolCall {
    let arguments = if args.is_null() {
        "{}".to_owned()
    } else {
        args.to_string()
    };

    OpenAiToolCall {
        id: format!("{name}-{index}"),
        tool_type: "function".to_owned(),
        function: OpenAiFunctionCall {
            name: name.to_owned(),
            arguments,
        },
    }
}

pub(crate) const fn usage(metadata: GoogleUsageMetadata) -> OpenAiUsage {
    OpenAiUsage {
        prompt_tokens: metadata.prompt_token_count,
        completion_tokens: metadata.candidates_token_count,
        total_tokens: metadata.total_token_count,
    }
}
