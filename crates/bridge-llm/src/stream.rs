//! Backend stream to `OpenAI` chunk stream
//!
//! [`StreamTranslator`] is a synchronous state machine fed one backend frame
//! at a time. [`spawn`] drives it from a background task into a bounded
//! channel that the HTTP response drains.

use std::collections::BTreeMap;

use bridge_telemetry::BridgeMetrics;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::convert::response::{tool_call, usage};
use crate::convert::{finish_reason, unix_now};
use crate::error::{LlmError, stream_error_body};
use crate::protocol::google::{GooglePart, GoogleResponse};
use crate::protocol::openai::{
    OpenAiErrorResponse, OpenAiStreamChoice, OpenAiStreamChunk, OpenAiStreamDelta, OpenAiStreamToolCall, OpenAiUsage,
};
use crate::provider::BackendStream;

/// Terminal sentinel payload
pub const DONE: &str = "[DONE]";

/// One SSE data payload
#[derive(Debug, Clone)]
pub enum StreamFrame {
    Chunk(Box<OpenAiStreamChunk>),
    Error(OpenAiErrorResponse),
    Done,
}

impl StreamFrame {
    /// Text for the SSE `data:` field
    pub fn data(&self) -> String {
        match self {
            Self::Chunk(chunk) => serde_json::to_string(chunk).unwrap_or_default(),
            Self::Error(error) => serde_json::to_string(error).unwrap_or_default(),
            Self::Done => DONE.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Forwarding backend increments
    Streaming,
    /// Every choice reported a finish reason; trailing frames pending
    Finishing,
    /// Sentinel emitted; nothing more will be produced
    Done,
}

#[derive(Debug, Default)]
struct ChoiceState {
    started: bool,
    tool_calls: usize,
    finished: bool,
    /// Text from an increment that also carried a finish reason
    pending: String,
}

/// Per-request streaming state machine
pub struct StreamTranslator {
    id: String,
    model: String,
    created: u64,
    /// Characters left to emit one at a time
    budget: usize,
    include_usage: bool,
    choices: BTreeMap<u32, ChoiceState>,
    usage: Option<OpenAiUsage>,
    state: StreamState,
}

impl StreamTranslator {
    pub fn new(id: String, model: String, char_budget: usize, include_usage: bool) -> Self {
        Self {
            id,
            model,
            created: unix_now(),
            budget: char_budget,
            include_usage,
            choices: BTreeMap::new(),
            usage: None,
            state: StreamState::Streaming,
        }
    }

    pub const fn state(&self) -> StreamState {
        self.state
    }

    /// Translate one backend increment
    pub fn push(&mut self, response: GoogleResponse) -> Vec<StreamFrame> {
        if self.state != StreamState::Streaming {
            return Vec::new();
        }

        if let Some(metadata) = response.usage_metadata {
            self.usage = Some(usage(metadata));
        }

        let mut frames = Vec::new();

        for candidate in &response.candidates {
            let index = candidate.index;
            if self.choice(index).finished {
                continue;
            }

            let finishing = candidate.finish_reason.is_some();

            for part in candidate.parts() {
                match part {
                    GooglePart::Text(text) if finishing => self.choice(index).pending.push_str(text),
                    GooglePart::Text(text) => self.emit_text(index, text, &mut frames),
                    GooglePart::FunctionCall(call) => {
                        self.flush_pending(index, &mut frames);
                        let position = self.choice(index).tool_calls;
                        self.choice(index).tool_calls += 1;

                        let call = tool_call(&call.name, &call.args, position);
                        let delta = OpenAiStreamDelta {
                            tool_calls: Some(vec![OpenAiStreamToolCall {
                                index: u32::try_from(position).unwrap_or(u32::MAX),
                                id: call.id,
                                tool_type: call.tool_type,
                                function: call.function,
                            }]),
                            ..OpenAiStreamDelta::default()
                        };
                        frames.push(self.chunk(index, delta, None));
                    }
                    GooglePart::InlineData(_) | GooglePart::FunctionResponse(_) => {}
                }
            }

            if let Some(reason) = candidate.finish_reason.as_deref() {
                self.finish_choice(index, finish_reason(reason), &mut frames);
            }
        }

        if !self.choices.is_empty() && self.choices.values().all(|c| c.finished) {
            self.state = StreamState::Finishing;
        }

        frames
    }

    /// Close the stream after the backend sequence ended or every choice finished
    pub fn finish(&mut self) -> Vec<StreamFrame> {
        if self.state == StreamState::Done {
            return Vec::new();
        }

        let mut frames = Vec::new();

        if self.choices.is_empty() {
            self.choices.insert(0, ChoiceState::default());
        }

        let open: Vec<u32> = self
            .choices
            .iter()
            .filter(|(_, c)| !c.finished)
            .map(|(index, _)| *index)
            .collect();

        for index in open {
            self.finish_choice(index, "stop", &mut frames);
        }

        if self.include_usage
            && let Some(usage) = self.usage
        {
            frames.push(StreamFrame::Chunk(Box::new(OpenAiStreamChunk {
                id: self.id.clone(),
                object: "chat.completion.chunk".to_owned(),
                created: self.created,
                model: self.model.clone(),
                choices: Vec::new(),
                usage: Some(usage),
            })));
        }

        frames.push(StreamFrame::Done);
        self.state = StreamState::Done;

        frames
    }

    /// Abort with one error chunk followed by the sentinel
    pub fn fail(&mut self, error: &LlmError) -> Vec<StreamFrame> {
        if self.state == StreamState::Done {
            return Vec::new();
        }

        self.state = StreamState::Done;
        vec![StreamFrame::Error(stream_error_body(error)), StreamFrame::Done]
    }

    fn choice(&mut self, index: u32) -> &mut ChoiceState {
        self.choices.entry(index).or_default()
    }

    /// Character-at-a-time while budget lasts, whole blocks afterwards
    fn emit_text(&mut self, index: u32, text: &str, frames: &mut Vec<StreamFrame>) {
        let mut rest = text;

        while self.budget > 0 {
            let mut chars = rest.chars();
            let Some(c) = chars.next() else {
                return;
            };
            rest = chars.as_str();
            self.budget -= 1;

            frames.push(self.text_chunk(index, c.to_string()));
        }

        if !rest.is_empty() {
            frames.push(self.text_chunk(index, rest.to_owned()));
        }
    }

    fn flush_pending(&mut self, index: u32, frames: &mut Vec<StreamFrame>) {
        let pending = std::mem::take(&mut self.choice(index).pending);
        if !pending.is_empty() {
            frames.push(self.text_chunk(index, pending));
        }
    }

    fn finish_choice(&mut self, index: u32, reason: &str, frames: &mut Vec<StreamFrame>) {
        self.flush_pending(index, frames);

        let state = self.choice(index);
        state.finished = true;
        let reason = if state.tool_calls > 0 { "tool_calls" } else { reason };

        frames.push(self.chunk(index, OpenAiStreamDelta::default(), Some(reason)));
    }

    fn text_chunk(&mut self, index: u32, content: String) -> StreamFrame {
        let delta = OpenAiStreamDelta {
            content: Some(content),
            ..OpenAiStreamDelta::default()
        };
        self.chunk(index, delta, None)
    }

    fn chunk(&mut self, index: u32, mut delta: OpenAiStreamDelta, finish: Option<&str>) -> StreamFrame {
        let state = self.choice(index);
        if !state.started {
            state.started = true;
            delta.role = Some("assistant".to_owned());
        }

        StreamFrame::Chunk(Box::new(OpenAiStreamChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_owned(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![OpenAiStreamChoice {
                index,
                delta,
                finish_reason: finish.map(str::to_owned),
            }],
            usage: None,
        }))
    }
}

/// Drive a translator from a background task
///
/// The task stops reading the backend as soon as the returned stream is
/// dropped. Cancelling `shutdown` ends the stream with a cancelled error chunk.
pub fn spawn(
    mut translator: StreamTranslator,
    mut upstream: BackendStream,
    capacity: usize,
    shutdown: CancellationToken,
    metrics: BridgeMetrics,
) -> impl Stream<Item = StreamFrame> + Send + 'static {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let model = translator.model.clone();

    tokio::spawn(async move {
        loop {
            let frames = tokio::select! {
                biased;
                () = tx.closed() => {
                    tracing::debug!(model = %model, "client disconnected, dropping backend stream");
                    return;
                }
                () = shutdown.cancelled() => translator.fail(&LlmError::Cancelled),
                item = upstream.next() => match item {
                    Some(Ok(response)) => {
                        let mut frames = translator.push(response);
                        if translator.state() == StreamState::Finishing {
                            frames.extend(translator.finish());
                        }
                        frames
                    }
                    Some(Err(e)) => {
                        tracing::warn!(model = %model, error = %e, "backend stream failed");
                        metrics.record_backend_error(e.kind());
                        translator.fail(&e)
                    }
                    None => translator.finish(),
                },
            };

            for frame in frames {
                if matches!(frame, StreamFrame::Chunk(_)) {
                    metrics.record_chunk(&model);
                }
                if tx.send(frame).await.is_err() {
                    return;
                }
            }

            if translator.state() == StreamState::Done {
                return;
            }
        }
    });

    futures_util::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|frame| (frame, rx)) })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::protocol::openai::ErrorCode;

    fn frame(value: serde_json::Value) -> GoogleResponse {
        serde_json::from_value(value).unwrap()
    }

    fn text(t: &str) -> GoogleResponse {
        frame(json!({"candidates": [{"content": {"role": "model", "parts": [{"text": t}]}, "index": 0}]}))
    }

    fn finished(t: &str, reason: &str) -> GoogleResponse {
        frame(json!({"candidates": [{
            "content": {"role": "model", "parts": [{"text": t}]},
            "finishReason": reason,
            "index": 0
        }]}))
    }

    fn translator(budget: usize) -> StreamTranslator {
        StreamTranslator::new("chatcmpl-test".to_owned(), "gpt-4".to_owned(), budget, false)
    }

    fn chunks(frames: &[StreamFrame]) -> Vec<&OpenAiStreamChunk> {
        frames
            .iter()
            .filter_map(|f| match f {
                StreamFrame::Chunk(c) => Some(c.as_ref()),
                _ => None,
            })
            .collect()
    }

    fn contents(frames: &[StreamFrame]) -> Vec<String> {
        chunks(frames)
            .iter()
            .flat_map(|c| &c.choices)
            .filter_map(|c| c.delta.content.clone())
            .collect()
    }

    fn finish_reasons(frames: &[StreamFrame]) -> Vec<String> {
        chunks(frames)
            .iter()
            .flat_map(|c| &c.choices)
            .filter_map(|c| c.finish_reason.clone())
            .collect()
    }

    fn run(translator: &mut StreamTranslator, responses: Vec<GoogleResponse>) -> Vec<StreamFrame> {
        let mut frames = Vec::new();
        for response in responses {
            frames.extend(translator.push(response));
            if translator.state() == StreamState::Finishing {
                break;
            }
        }
        frames.extend(translator.finish());
        frames
    }

    #[test]
    fn characters_within_budget_then_blocks() {
        let mut translator = translator(3);
        let frames = run(&mut translator, vec![text("abcdef"), text("gh")]);

        assert_eq!(contents(&frames), ["a", "b", "c", "def", "gh"]);
        assert_eq!(finish_reasons(&frames), ["stop"]);
        assert!(matches!(frames.last(), Some(StreamFrame::Done)));
    }

    #[test]
    fn budget_is_shared_across_increments() {
        let mut translator = translator(4);
        let frames = run(&mut translator, vec![text("ab"), text("cdef")]);

        assert_eq!(contents(&frames), ["a", "b", "c", "d", "ef"]);
    }

    #[test]
    fn budget_counts_unicode_scalars() {
        let mut translator = translator(2);
        let frames = run(&mut translator, vec![text("héllo")]);

        assert_eq!(contents(&frames), ["h", "é", "llo"]);
    }

    #[test]
    fn max_tokens_after_three_increments() {
        let mut translator = translator(1000);
        let frames = run(
            &mut translator,
            vec![text("The "), text("quick "), text("brown"), finished("", "MAX_TOKENS")],
        );

        assert_eq!(contents(&frames).concat(), "The quick brown");
        assert_eq!(finish_reasons(&frames), ["length"]);
        assert_eq!(frames.iter().filter(|f| matches!(f, StreamFrame::Done)).count(), 1);
        assert!(matches!(frames.last(), Some(StreamFrame::Done)));
    }

    #[test]
    fn text_on_finishing_increment_is_flushed_as_one_block() {
        let mut translator = translator(1000);
        let frames = run(&mut translator, vec![text("Hi"), finished(" there!", "STOP")]);

        assert_eq!(contents(&frames), ["H", "i", " there!"]);
        assert_eq!(finish_reasons(&frames), ["stop"]);

        let all = chunks(&frames);
        let finish_position = all.iter().position(|c| c.choices[0].finish_reason.is_some()).unwrap();
        assert_eq!(finish_position, all.len() - 1);
    }

    #[test]
    fn finish_reason_is_terminal() {
        let mut translator = translator(1000);

        translator.push(finished("done", "STOP"));
        assert_eq!(translator.state(), StreamState::Finishing);
        assert!(translator.push(text("late")).is_empty());
    }

    #[test]
    fn concatenated_text_matches_backend_text() {
        let pieces = ["Lorem ipsum ", "dolor sit amet, ", "consectetur ", "adipiscing elit."];
        let mut responses: Vec<_> = pieces.iter().map(|p| text(p)).collect();
        responses.push(finished("", "STOP"));

        for budget in [1, 5, 20, 1000] {
            let mut translator = translator(budget);
            let frames = run(&mut translator, responses.clone());

            assert_eq!(contents(&frames).concat(), pieces.concat(), "budget {budget}");
            assert_eq!(finish_reasons(&frames).len(), 1);
        }
    }

    #[test]
    fn first_chunk_carries_role() {
        let mut translator = translator(1000);
        let frames = run(&mut translator, vec![text("ab")]);
        let all = chunks(&frames);

        assert_eq!(all[0].choices[0].delta.role.as_deref(), Some("assistant"));
        assert!(all[1..].iter().all(|c| c.choices[0].delta.role.is_none()));
        assert!(all.iter().all(|c| c.id == "chatcmpl-test" && c.object == "chat.completion.chunk"));
    }

    #[test]
    fn end_of_sequence_without_reason_is_stop() {
        let mut translator = translator(1000);
        let frames = run(&mut translator, Vec::new());

        assert_eq!(finish_reasons(&frames), ["stop"]);
        assert!(matches!(frames.last(), Some(StreamFrame::Done)));
    }

    #[test]
    fn tool_call_is_one_complete_chunk() {
        let mut translator = translator(1000);
        let frames = run(
            &mut translator,
            vec![frame(json!({"candidates": [{
                "content": {"role": "model", "parts": [
                    {"functionCall": {"name": "get_weather", "args": {"city": "Paris"}}}
                ]},
                "finishReason": "STOP",
                "index": 0
            }]}))],
        );

        let all = chunks(&frames);
        let calls = all[0].choices[0].delta.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "get_weather-0");
        assert_eq!(calls[0].function.arguments, r#"{"city":"Paris"}"#);
        assert_eq!(finish_reasons(&frames), ["tool_calls"]);
    }

    #[test]
    fn usage_chunk_follows_finish_when_requested() {
        let mut translator = StreamTranslator::new("id".to_owned(), "gpt-4".to_owned(), 1000, true);
        let frames = run(
            &mut translator,
            vec![frame(json!({
                "candidates": [{"content": {"parts": [{"text": "ok"}]}, "finishReason": "STOP"}],
                "usageMetadata": {"promptTokenCount": 2, "candidatesTokenCount": 1, "totalTokenCount": 3}
            }))],
        );

        let all = chunks(&frames);
        let last = all.last().unwrap();
        assert!(last.choices.is_empty());
        assert_eq!(last.usage.unwrap().total_tokens, 3);
    }

    #[test]
    fn error_ends_stream_with_one_error_chunk() {
        let mut translator = translator(1000);
        translator.push(text("partial"));

        let frames = translator.fail(&LlmError::Backend {
            status: http::StatusCode::TOO_MANY_REQUESTS,
            reason: None,
            message: "quota".to_owned(),
        });

        assert_eq!(frames.len(), 2);
        assert!(matches!(
            &frames[0],
            StreamFrame::Error(e) if e.error.code == Some(ErrorCode::Status(429))
        ));
        assert_eq!(frames[1].data(), DONE);
        assert!(translator.finish().is_empty());
        assert!(translator.fail(&LlmError::Cancelled).is_empty());
    }

    #[tokio::test]
    async fn spawned_stream_ends_with_sentinel() {
        let upstream: BackendStream = Box::pin(futures_util::stream::iter(vec![
            Ok(text("hi")),
            Ok(finished("", "MAX_TOKENS")),
        ]));

        let frames: Vec<StreamFrame> = spawn(
            translator(1000),
            upstream,
            4,
            CancellationToken::new(),
            BridgeMetrics::new(),
        )
        .collect()
        .await;

        assert_eq!(contents(&frames).concat(), "hi");
        assert_eq!(finish_reasons(&frames), ["length"]);
        assert!(matches!(frames.last(), Some(StreamFrame::Done)));
    }

    #[tokio::test]
    async fn shutdown_emits_cancelled_chunk() {
        let upstream: BackendStream = Box::pin(futures_util::stream::pending());
        let shutdown = CancellationToken::new();

        let stream = spawn(translator(1000), upstream, 4, shutdown.clone(), BridgeMetrics::new());
        shutdown.cancel();

        let frames: Vec<StreamFrame> = tokio::time::timeout(Duration::from_secs(5), stream.collect())
            .await
            .unwrap();

        assert!(matches!(
            &frames[0],
            StreamFrame::Error(e) if e.error.code == Some(ErrorCode::Status(408))
        ));
        assert!(matches!(frames[1], StreamFrame::Done));
    }

    #[tokio::test]
    async fn dropping_consumer_stops_producer() {
        let (probe_tx, mut probe_rx) = mpsc::channel::<()>(1);
        let upstream: BackendStream = Box::pin(futures_util::stream::pending::<Result<GoogleResponse, LlmError>>()
            .chain(futures_util::stream::once(async move {
                drop(probe_tx);
                Ok(GoogleResponse::default())
            })));

        let stream = spawn(translator(1000), upstream, 4, CancellationToken::new(), BridgeMetrics::new());
        drop(stream);

        // the producer owns the upstream; once it exits the probe sender is dropped
        let closed = tokio::time::timeout(Duration::from_secs(5), probe_rx.recv()).await.unwrap();
        assert!(closed.is_none());
    }
}
