use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{AikaConfig, DEFAULT_BACKEND_URL};
use crate::error::ChatError;
use crate::retry::{with_backoff, RetryPolicy};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatRequestBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolUse {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatResponse {
    #[serde(default)]
    pub reply: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub tool_used: Option<ToolUse>,
    #[serde(default)]
    pub tool_result: Option<Value>,
    #[serde(default)]
    pub learned_facts: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DonePayload {
    #[serde(default)]
    pub reply: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub tool_used: Option<ToolUse>,
    #[serde(default)]
    pub tool_result: Option<Value>,
    #[serde(default)]
    pub learned_facts: Option<Vec<String>>,
}

/// One event of the `/chat/stream` body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Chunk {
        #[serde(default)]
        text: String,
    },
    Done(DonePayload),
    Error {
        #[serde(default)]
        message: Option<String>,
    },
}

pub type StreamEventStream =
    Pin<Box<dyn Stream<Item = Result<StreamEvent, ChatError>> + Send>>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionListItem {
    pub id: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub preview: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionMessageItem {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionMessagesResponse {
    pub session_id: String,
    #[serde(default)]
    pub messages: Vec<SessionMessageItem>,
}

#[derive(Debug, Deserialize)]
struct GreetingResponse {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<Value>,
}

/// The chat backend as seen by the reconciler.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn post_chat(&self, request: &ChatRequestBody) -> Result<ChatResponse, ChatError>;

    /// Open the streaming endpoint. The returned sequence is single-pass.
    async fn stream_chat(&self, request: &ChatRequestBody) -> Result<StreamEventStream, ChatError>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn from_config(config: &AikaConfig) -> Result<Self, ChatError> {
        let http =
            crate::http_client::build_http_client_with_timeout(Some(config.request_timeout()))?;
        Ok(Self {
            http,
            base_url: normalize_base_url(&config.backend_url),
            token: config.auth_token().map(str::to_string),
            retry: config.retry.policy(),
        })
    }

    pub fn new(base_url: String, token: Option<String>) -> Result<Self, ChatError> {
        Ok(Self {
            http: crate::http_client::build_http_client()?,
            base_url: normalize_base_url(&base_url),
            token: token.filter(|t| !t.trim().is_empty()),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// `true` when `/health` answers 2xx, retrying transient failures.
    pub async fn health_check(&self) -> bool {
        let client = self;
        let result = with_backoff(&self.retry, "GET /health", move || async move {
            let response = client
                .request(reqwest::Method::GET, "/health")
                .timeout(HEALTH_TIMEOUT)
                .send()
                .await?;
            check_status(response).await.map(|_| ())
        })
        .await;
        match result {
            Ok(()) => true,
            Err(error) => {
                tracing::debug!("Health check against {} failed: {}", self.base_url, error);
                false
            }
        }
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionListItem>, ChatError> {
        let client = self;
        with_backoff(&self.retry, "GET /chat/sessions", move || async move {
            let response = client.request(reqwest::Method::GET, "/chat/sessions").send().await?;
            let response = check_status(response).await?;
            let body = response.text().await?;
            serde_json::from_str::<Vec<SessionListItem>>(&body).map_err(|e| {
                ChatError::Decode(format!(
                    "{} (payload preview: {})",
                    e,
                    body.chars().take(500).collect::<String>()
                ))
            })
        })
        .await
    }

    pub async fn session_messages(&self, session_id: &str) -> Result<SessionMessagesResponse, ChatError> {
        let path = format!("/chat/sessions/{}/messages", urlencoding::encode(session_id));
        let (client, path) = (self, path.as_str());
        with_backoff(&self.retry, path, move || async move {
            let response = client.request(reqwest::Method::GET, path).send().await?;
            let response = check_status(response).await?;
            Ok(response.json::<SessionMessagesResponse>().await?)
        })
        .await
    }

    pub async fn greeting(&self) -> Result<String, ChatError> {
        let client = self;
        with_backoff(&self.retry, "GET /chat/greeting", move || async move {
            let response = client.request(reqwest::Method::GET, "/chat/greeting").send().await?;
            let response = check_status(response).await?;
            Ok(response.json::<GreetingResponse>().await?.message)
        })
        .await
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.http.request(method, url);
        if let Some(token) = self.token.as_deref() {
            builder = builder.bearer_auth(token);
        }
        builder
    }
}

#[async_trait]
impl ChatTransport for ApiClient {
    async fn post_chat(&self, request: &ChatRequestBody) -> Result<ChatResponse, ChatError> {
        let response = self
            .request(reqwest::Method::POST, "/chat")
            .json(request)
            .send()
            .await?;
        let response = check_status(response).await?;
        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| ChatError::Decode(e.to_string()))
    }

    async fn stream_chat(&self, request: &ChatRequestBody) -> Result<StreamEventStream, ChatError> {
        let response = self
            .request(reqwest::Method::POST, "/chat/stream")
            .json(request)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(crate::sse::event_stream(response.bytes_stream()))
    }
}

/// Turn a non-2xx response into `ChatError::Status`, preferring the
/// backend's `detail` field over the bare status line.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ChatError::Status {
        status: status.as_u16(),
        detail: error_detail(status, &body),
    })
}

fn error_detail(status: reqwest::StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.detail)
        .map(|detail| match detail {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .filter(|detail| !detail.trim().is_empty());

    detail.unwrap_or_else(|| {
        format!(
            "HTTP {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown")
        )
    })
}

fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        DEFAULT_BACKEND_URL.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_base_url() {
        assert_eq!(normalize_base_url("http://x:1/"), "http://x:1");
        assert_eq!(normalize_base_url("  "), "http://localhost:8000");
    }

    #[test]
    fn request_body_omits_missing_session() {
        let body = ChatRequestBody {
            message: "hi".to_string(),
            session_id: None,
        };
        assert_eq!(
            serde_json::to_value(&body).expect("serialize"),
            serde_json::json!({"message": "hi"})
        );
    }

    #[test]
    fn chat_response_tolerates_null_optionals() {
        let parsed: ChatResponse = serde_json::from_value(serde_json::json!({
            "reply": "hello",
            "session_id": "s1",
            "tool_used": null,
            "tool_result": null,
            "learned_facts": null
        }))
        .expect("decode response");
        assert_eq!(parsed.reply, "hello");
        assert!(parsed.tool_used.is_none());
        assert!(parsed.learned_facts.is_none());
    }

    #[test]
    fn stream_event_tags_decode() {
        let chunk: StreamEvent =
            serde_json::from_str(r#"{"type":"chunk","text":"Hel"}"#).expect("chunk");
        assert_eq!(chunk, StreamEvent::Chunk { text: "Hel".into() });

        let empty_chunk: StreamEvent = serde_json::from_str(r#"{"type":"chunk"}"#).expect("chunk");
        assert_eq!(empty_chunk, StreamEvent::Chunk { text: String::new() });

        let done: StreamEvent = serde_json::from_str(
            r#"{"type":"done","reply":"Hello there","session_id":"s9","tool_used":{"tool":"web_search","args":{"q":"rust"}},"tool_result":{"hits":1},"learned_facts":["likes rust"]}"#,
        )
        .expect("done");
        match done {
            StreamEvent::Done(payload) => {
                assert_eq!(payload.reply.as_deref(), Some("Hello there"));
                assert_eq!(payload.tool_used.map(|t| t.tool).as_deref(), Some("web_search"));
                assert_eq!(payload.learned_facts.map(|f| f.len()), Some(1));
            }
            other => panic!("wrong variant: {:?}", other),
        }

        let error: StreamEvent =
            serde_json::from_str(r#"{"type":"error","message":"model offline"}"#).expect("error");
        assert_eq!(
            error,
            StreamEvent::Error {
                message: Some("model offline".into())
            }
        );
    }

    #[test]
    fn error_detail_prefers_backend_detail() {
        let status = reqwest::StatusCode::BAD_REQUEST;
        assert_eq!(
            error_detail(status, r#"{"detail":"message must be non-empty."}"#),
            "message must be non-empty."
        );
        assert_eq!(error_detail(status, "<html>"), "HTTP 400: Bad Request");
    }

    #[test]
    fn session_ids_are_percent_encoded() {
        assert_eq!(urlencoding::encode("abc-123"), "abc-123");
        assert_eq!(urlencoding::encode("a b/c"), "a%20b%2Fc");
    }

    #[test]
    fn session_messages_deserialize() {
        let parsed: SessionMessagesResponse = serde_json::from_value(serde_json::json!({
            "session_id": "s1",
            "messages": [
                {"role": "user", "content": "hi", "created_at": "2026-02-18T06:17:38Z"},
                {"role": "assistant", "content": "hello", "created_at": "2026-02-18T06:17:40Z"}
            ]
        }))
        .expect("decode history");
        assert_eq!(parsed.messages.len(), 2);
        assert_eq!(parsed.messages[1].role, "assistant");
    }

    #[test]
    fn api_client_drops_blank_token() {
        let client = ApiClient::new("http://127.0.0.1:8000/".to_string(), Some("  ".to_string()))
            .expect("client");
        assert_eq!(client.base_url(), "http://127.0.0.1:8000");
        assert!(!client.has_token());
    }

    /// Serves one canned status line per connection, in order.
    async fn scripted_server(statuses: Vec<&'static str>) -> (String, tokio::task::JoinHandle<usize>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = tokio::spawn(async move {
            let mut served = 0;
            for status in statuses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                let reply = format!(
                    "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
                served += 1;
            }
            served
        });
        (format!("http://{}", addr), server)
    }

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn health_check_retries_server_errors() {
        let (base_url, server) =
            scripted_server(vec!["503 Service Unavailable", "200 OK"]).await;
        let client = ApiClient::new(base_url, None)
            .expect("client")
            .with_retry_policy(fast_retry(3));

        assert!(client.health_check().await);
        assert_eq!(server.await.expect("server"), 2);
    }

    #[tokio::test]
    async fn health_check_gives_up_after_retries() {
        let (base_url, server) = scripted_server(vec![
            "502 Bad Gateway",
            "502 Bad Gateway",
            "502 Bad Gateway",
        ])
        .await;
        let client = ApiClient::new(base_url, None)
            .expect("client")
            .with_retry_policy(fast_retry(2));

        assert!(!client.health_check().await);
        assert_eq!(server.await.expect("server"), 3);
    }

    #[tokio::test]
    async fn health_check_does_not_retry_client_errors() {
        let (base_url, server) = scripted_server(vec!["404 Not Found"]).await;
        let client = ApiClient::new(base_url, None)
            .expect("client")
            .with_retry_policy(fast_retry(3));

        assert!(!client.health_check().await);
        assert_eq!(server.await.expect("server"), 1);
    }
}
