//! Turns one backend reply (single JSON or event stream) into transcript
//! events.
//!
//! Every step of a send is reported as a [`ChatEvent`] through one
//! [`ChatEventSink`]; the caller folds them (see [`super::state::ChatState`]).

use futures_util::StreamExt;
use serde_json::{json, Value};

use super::{now_time, AttachmentRef, Badge, ChatMessage, ToolCallRecord, ToolCallStatus, ToolLogEntry};
use crate::api::{ChatRequestBody, ChatResponse, ChatTransport, DonePayload, StreamEvent, ToolUse};
use crate::error::ChatError;

#[derive(Debug, Clone, PartialEq)]
pub struct SendRequest {
    pub message: String,
    pub session_id: Option<String>,
    pub attachments: Vec<AttachmentRef>,
    pub stream_enabled: bool,
}

impl SendRequest {
    fn body(&self) -> ChatRequestBody {
        ChatRequestBody {
            message: self.message.clone(),
            session_id: self.session_id.clone().filter(|id| !id.is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    LoadingChanged(bool),
    StreamingStarted,
    /// Full accumulated text so far, not the delta.
    StreamingUpdated(String),
    StreamingEnded,
    AssistantMessage(ChatMessage),
    ToolLogged(ToolLogEntry),
    SessionIdUpdated(String),
    Failed(String),
}

pub trait ChatEventSink: Send + Sync {
    fn emit(&self, event: ChatEvent);
}

impl ChatEventSink for flume::Sender<ChatEvent> {
    fn emit(&self, event: ChatEvent) {
        if self.send(event).is_err() {
            tracing::debug!("Chat event receiver dropped");
        }
    }
}

/// Emits `LoadingChanged(false)` however the send ends, including abort.
struct LoadingGuard<'a> {
    sink: &'a dyn ChatEventSink,
}

impl<'a> LoadingGuard<'a> {
    fn start(sink: &'a dyn ChatEventSink) -> Self {
        sink.emit(ChatEvent::LoadingChanged(true));
        Self { sink }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.sink.emit(ChatEvent::LoadingChanged(false));
    }
}

/// Send one user message and report every step to `sink`.
///
/// Failures are reported as `ChatEvent::Failed`; nothing is returned.
pub async fn send_chat_message(
    transport: &dyn ChatTransport,
    request: SendRequest,
    sink: &dyn ChatEventSink,
) {
    let _loading = LoadingGuard::start(sink);
    let body = request.body();

    tracing::debug!(
        "Sending chat message ({} chars, {} attachment(s), stream={})",
        body.message.len(),
        request.attachments.len(),
        request.stream_enabled
    );

    if request.stream_enabled {
        send_streamed(transport, &body, sink).await;
    } else {
        send_once(transport, &body, sink).await;
    }
}

async fn send_once(transport: &dyn ChatTransport, body: &ChatRequestBody, sink: &dyn ChatEventSink) {
    match transport.post_chat(body).await {
        Ok(response) => {
            let done = DonePayload::from(response);
            emit_final(&done, "", sink);
        }
        Err(error) => {
            tracing::warn!("Chat request failed: {}", error);
            sink.emit(ChatEvent::Failed(error.to_string()));
        }
    }
}

async fn send_streamed(transport: &dyn ChatTransport, body: &ChatRequestBody, sink: &dyn ChatEventSink) {
    sink.emit(ChatEvent::StreamingStarted);

    let mut accumulated = String::new();
    let Err(error) = consume_stream(transport, body, sink, &mut accumulated).await else {
        return;
    };

    tracing::warn!(
        "Chat stream failed after {} chars: {}",
        accumulated.len(),
        error
    );
    if !accumulated.is_empty() {
        sink.emit(ChatEvent::AssistantMessage(
            ChatMessage::assistant(accumulated).with_badges(vec![Badge::incomplete()]),
        ));
    }
    sink.emit(ChatEvent::StreamingEnded);
    sink.emit(ChatEvent::Failed(error.to_string()));
}

/// Consume events until `done`. `Ok` means the reply was finalized and
/// streaming already ended.
async fn consume_stream(
    transport: &dyn ChatTransport,
    body: &ChatRequestBody,
    sink: &dyn ChatEventSink,
    accumulated: &mut String,
) -> Result<(), ChatError> {
    let mut events = transport.stream_chat(body).await?;

    while let Some(event) = events.next().await {
        match event? {
            StreamEvent::Chunk { text } => {
                accumulated.push_str(&text);
                sink.emit(ChatEvent::StreamingUpdated(accumulated.clone()));
            }
            StreamEvent::Done(done) => {
                emit_final(&done, accumulated, sink);
                sink.emit(ChatEvent::StreamingEnded);
                return Ok(());
            }
            StreamEvent::Error { message } => {
                return Err(ChatError::StreamProtocol(
                    message
                        .filter(|m| !m.trim().is_empty())
                        .unwrap_or_else(|| "Unknown error from stream".to_string()),
                ));
            }
        }
    }

    Err(ChatError::StreamClosed)
}

fn emit_final(done: &DonePayload, accumulated: &str, sink: &dyn ChatEventSink) {
    if let Some(session_id) = done.session_id.as_deref().filter(|id| !id.is_empty()) {
        sink.emit(ChatEvent::SessionIdUpdated(session_id.to_string()));
    }
    if let Some(entry) = tool_log_entry(done.tool_used.as_ref(), done.tool_result.as_ref()) {
        sink.emit(ChatEvent::ToolLogged(entry));
    }
    sink.emit(ChatEvent::AssistantMessage(finalize_reply(done, accumulated)));
}

/// Build the finalized assistant message. A non-empty `reply` wins over the
/// streamed accumulator.
pub fn finalize_reply(done: &DonePayload, accumulated: &str) -> ChatMessage {
    let text = done
        .reply
        .as_deref()
        .filter(|reply| !reply.is_empty())
        .unwrap_or(accumulated)
        .to_string();

    let mut badges = vec![Badge::local()];
    let learned = done.learned_facts.as_ref().map_or(0, Vec::len);
    if learned > 0 {
        badges.push(Badge::learned(learned));
    }

    let tool_calls = tool_call_record(done.tool_used.as_ref(), done.tool_result.as_ref())
        .into_iter()
        .collect();

    ChatMessage::assistant(text)
        .with_badges(badges)
        .with_tool_calls(tool_calls)
}

/// A tool call is only recorded when both the call and its result arrived.
pub fn tool_call_record(tool: Option<&ToolUse>, result: Option<&Value>) -> Option<ToolCallRecord> {
    let (tool, result) = (tool?, result?);
    Some(ToolCallRecord {
        name: tool.tool.clone(),
        status: ToolCallStatus::Success,
        args_json: pretty(&tool.args),
        result_json: Some(pretty(result)),
        error_text: None,
    })
}

pub fn tool_log_entry(tool: Option<&ToolUse>, result: Option<&Value>) -> Option<ToolLogEntry> {
    let (tool, result) = (tool?, result?);
    Some(ToolLogEntry {
        name: tool.tool.clone(),
        payload: pretty(&json!({ "args": tool.args, "result": result })),
        time: now_time(),
    })
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

impl From<ChatResponse> for DonePayload {
    fn from(response: ChatResponse) -> Self {
        Self {
            reply: Some(response.reply),
            session_id: Some(response.session_id),
            tool_used: response.tool_used,
            tool_result: response.tool_result,
            learned_facts: response.learned_facts,
        }
    }
}
