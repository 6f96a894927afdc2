use thiserror::Error;

/// Failures surfaced by the chat pipeline.
///
/// Malformed SSE lines never reach this type; the decoder skips them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    /// Network failure before or during a request (connect, timeout, body read).
    #[error("{0}")]
    Transport(String),

    /// Backend answered with a non-2xx status.
    #[error("{detail}")]
    Status { status: u16, detail: String },

    /// Reply body could not be decoded.
    #[error("Failed to decode backend reply: {0}")]
    Decode(String),

    /// Explicit `error` event from the server stream.
    #[error("{0}")]
    StreamProtocol(String),

    /// The stream ended before a `done` event arrived.
    #[error("Stream closed before the reply finished")]
    StreamClosed,
}

impl ChatError {
    /// Network failures, timeouts and 5xx responses are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ChatError::Transport(_) => true,
            ChatError::Status { status, .. } => *status >= 500 || *status == 0,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return ChatError::Status {
                status: status.as_u16(),
                detail: error.to_string(),
            };
        }
        if error.is_decode() {
            return ChatError::Decode(error.to_string());
        }
        ChatError::Transport(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_covers_network_and_server_errors() {
        assert!(ChatError::Transport("connection refused".into()).is_retryable());
        assert!(ChatError::Status {
            status: 503,
            detail: "busy".into()
        }
        .is_retryable());
        assert!(!ChatError::Status {
            status: 400,
            detail: "message must be non-empty.".into()
        }
        .is_retryable());
        assert!(!ChatError::StreamProtocol("boom".into()).is_retryable());
    }

    #[test]
    fn status_error_displays_detail_only() {
        let error = ChatError::Status {
            status: 400,
            detail: "message must be non-empty.".into(),
        };
        assert_eq!(error.to_string(), "message must be non-empty.");
    }
}
