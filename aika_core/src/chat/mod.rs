//! Transcript data model plus the send pipeline built on it.

pub mod dispatcher;
pub mod loader;
pub mod reconciler;
pub mod state;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

pub use dispatcher::ChatDispatcher;
pub use loader::{BackendLoader, LoadEvent};
pub use reconciler::{send_chat_message, ChatEvent, ChatEventSink, SendRequest};
pub use state::{ChatState, DispatchedEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeKind {
    Good,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub text: String,
    pub kind: BadgeKind,
}

impl Badge {
    pub fn new(text: impl Into<String>, kind: BadgeKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }

    pub fn local() -> Self {
        Self::new("Local", BadgeKind::Good)
    }

    pub fn learned(count: usize) -> Self {
        Self::new(format!("Learned {} fact(s)", count), BadgeKind::Neutral)
    }

    pub fn incomplete() -> Self {
        Self::new("Incomplete", BadgeKind::Neutral)
    }

    pub fn error() -> Self {
        Self::new("Error", BadgeKind::Neutral)
    }

    pub fn files(count: usize) -> Self {
        Self::new(format!("{} file(s)", count), BadgeKind::Neutral)
    }
}

/// Metadata for a file the user attached. Contents never leave the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub id: String,
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub mime: Option<String>,
}

impl AttachmentRef {
    pub fn new(name: impl Into<String>, size: u64, mime: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            size,
            mime,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    Queued,
    Running,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub status: ToolCallStatus,
    pub args_json: String,
    #[serde(default)]
    pub result_json: Option<String>,
    #[serde(default)]
    pub error_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolLogEntry {
    pub name: String,
    pub payload: String,
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub badges: Vec<Badge>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
}

impl ChatMessage {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            timestamp: Utc::now(),
            badges: Vec::new(),
            tool_calls: Vec::new(),
            attachments: Vec::new(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    pub fn with_badges(mut self, badges: Vec<Badge>) -> Self {
        self.badges = badges;
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCallRecord>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<AttachmentRef>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn has_badge(&self, text: &str) -> bool {
        self.badges.iter().any(|badge| badge.text == text)
    }
}

/// Wall-clock `HH:MM` used for tool log entries.
pub fn now_time() -> String {
    Local::now().format("%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn badge_texts() {
        assert_eq!(Badge::learned(2).text, "Learned 2 fact(s)");
        assert_eq!(Badge::files(1).text, "1 file(s)");
        assert_eq!(Badge::local().kind, BadgeKind::Good);
        assert_eq!(Badge::incomplete().kind, BadgeKind::Neutral);
    }

    #[test]
    fn messages_get_unique_ids() {
        let a = ChatMessage::user("hi");
        let b = ChatMessage::user("hi");
        assert_ne!(a.id, b.id);
        assert_eq!(a.role, Role::User);
    }

    #[test]
    fn now_time_is_hh_mm() {
        let time = now_time();
        assert_eq!(time.len(), 5);
        assert_eq!(time.as_bytes()[2], b':');
    }
}
