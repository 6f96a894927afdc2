use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use super::reconciler::ChatEvent;
use super::{AttachmentRef, Badge, ChatMessage, ToolLogEntry};
use crate::api::{SessionListItem, SessionMessageItem};
use crate::avatar::mood::{MoodInputs, VoiceState};

pub const EXPORT_APP_NAME: &str = "Aika AI UI";

/// A reconciler event tagged with the send that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedEvent {
    pub generation: u64,
    pub event: ChatEvent,
}

/// Transcript and in-flight flags, folded from [`ChatEvent`]s on the UI thread.
#[derive(Debug, Default)]
pub struct ChatState {
    pub messages: Vec<ChatMessage>,
    pub streaming_text: Option<String>,
    pub is_loading: bool,
    pub is_streaming: bool,
    /// Set once the current send produced visible text.
    pub first_byte_received: bool,
    pub session_id: Option<String>,
    pub sessions: Vec<SessionListItem>,
    pub tool_log: Vec<ToolLogEntry>,
    pub pending_attachments: Vec<AttachmentRef>,
    pub last_error: Option<String>,
    generation: u64,
}

#[derive(Serialize)]
struct TranscriptExport<'a> {
    app: &'static str,
    exported_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
    messages: &'a [ChatMessage],
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Fold one event. Returns `false` when it came from a superseded send.
    pub fn apply(&mut self, dispatched: DispatchedEvent) -> bool {
        if dispatched.generation < self.generation {
            tracing::trace!(
                "Dropping stale chat event from generation {} (current {})",
                dispatched.generation,
                self.generation
            );
            return false;
        }
        if dispatched.generation > self.generation {
            self.begin_generation(dispatched.generation);
        }

        self.apply_event(dispatched.event);
        true
    }

    /// Move to a newer send, committing any half-streamed reply of the old one.
    pub fn begin_generation(&mut self, generation: u64) {
        if generation <= self.generation {
            return;
        }
        self.generation = generation;

        if let Some(partial) = self.streaming_text.take().filter(|text| !text.is_empty()) {
            self.messages
                .push(ChatMessage::assistant(partial).with_badges(vec![Badge::incomplete()]));
        }
        self.is_streaming = false;
        self.is_loading = false;
        self.first_byte_received = false;
    }

    fn apply_event(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::LoadingChanged(loading) => {
                self.is_loading = loading;
                if loading {
                    self.first_byte_received = false;
                    self.last_error = None;
                }
            }
            ChatEvent::StreamingStarted => {
                self.is_streaming = true;
                self.streaming_text = Some(String::new());
            }
            ChatEvent::StreamingUpdated(text) => {
                if !text.is_empty() {
                    self.first_byte_received = true;
                }
                self.streaming_text = Some(text);
            }
            ChatEvent::StreamingEnded => {
                self.is_streaming = false;
                self.streaming_text = None;
            }
            ChatEvent::AssistantMessage(message) => {
                self.first_byte_received = true;
                self.messages.push(message);
            }
            ChatEvent::ToolLogged(entry) => self.tool_log.push(entry),
            ChatEvent::SessionIdUpdated(id) => self.session_id = Some(id),
            ChatEvent::Failed(error) => {
                self.is_streaming = false;
                self.streaming_text = None;
                self.messages.push(
                    ChatMessage::assistant(format!(
                        "Sorry, I encountered an error: {}. Please try again.",
                        error
                    ))
                    .with_badges(vec![Badge::error()]),
                );
                self.last_error = Some(error);
            }
        }
    }

    /// Append the user's message, consuming the pending attachments.
    pub fn add_user_message(&mut self, text: impl Into<String>) -> &ChatMessage {
        let attachments = std::mem::take(&mut self.pending_attachments);
        let badges = if attachments.is_empty() {
            Vec::new()
        } else {
            vec![Badge::files(attachments.len())]
        };
        let index = self.messages.len();
        self.messages.push(
            ChatMessage::user(text)
                .with_badges(badges)
                .with_attachments(attachments),
        );
        &self.messages[index]
    }

    pub fn add_assistant_message(&mut self, text: impl Into<String>) {
        self.messages
            .push(ChatMessage::assistant(text).with_badges(vec![Badge::local()]));
    }

    pub fn add_attachment(&mut self, attachment: AttachmentRef) {
        self.pending_attachments.push(attachment);
    }

    pub fn remove_attachment(&mut self, id: &str) {
        self.pending_attachments.retain(|a| a.id != id);
    }

    pub fn mood_inputs(&self, voice: VoiceState) -> MoodInputs {
        MoodInputs {
            is_loading: self.is_loading && !self.first_byte_received,
            is_streaming: self.is_streaming && self.first_byte_received,
            voice_enabled: voice.enabled,
            wake_word_mode: voice.wake_word_mode,
            wake_word_heard: voice.wake_word_heard,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.is_loading || self.is_streaming
    }

    /// Empty the transcript, keeping the session.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.streaming_text = None;
    }

    /// Start over with no session. `generation` must come from the
    /// dispatcher's `cancel` so leftovers from an aborted send are dropped.
    pub fn new_chat(&mut self, generation: u64) {
        self.generation = self.generation.max(generation);
        self.messages.clear();
        self.pending_attachments.clear();
        self.session_id = None;
        self.streaming_text = None;
        self.is_loading = false;
        self.is_streaming = false;
        self.first_byte_received = false;
        self.last_error = None;
    }

    /// Replace the transcript with a stored session.
    pub fn load_history(&mut self, generation: u64, session_id: &str, items: &[SessionMessageItem]) {
        self.new_chat(generation);
        self.messages = items.iter().map(history_message).collect();
        self.session_id = Some(session_id.to_string());
    }

    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&TranscriptExport {
            app: EXPORT_APP_NAME,
            exported_at: Utc::now(),
            session_id: self.session_id.as_deref(),
            messages: &self.messages,
        })
    }
}

fn history_message(item: &SessionMessageItem) -> ChatMessage {
    let mut message = if item.role == "user" {
        ChatMessage::user(item.content.clone())
    } else {
        ChatMessage::assistant(item.content.clone()).with_badges(vec![Badge::local()])
    };
    if let Some(timestamp) = parse_timestamp(&item.created_at) {
        message.timestamp = timestamp;
    }
    message
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}
