//! Upstream client for an OpenAI-compatible chat-completion endpoint.
//!
//! Sends one bearer-authenticated streaming request and decodes the
//! `text/event-stream` body into [`UpstreamEvent`]s.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::UpstreamConfig;
use crate::relay::{ModelVariant, Prompt};

/// Errors reported by the upstream provider or the transport to it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum UpstreamError {
    /// The provider answered with a non-2xx status.
    #[error("upstream returned HTTP {status}: {message}")]
    Status {
        status: u16,
        code: Option<String>,
        kind: Option<String>,
        message: String,
    },

    /// The provider sent an error object inside an otherwise healthy stream.
    #[error("upstream reported an error: {message}")]
    Api {
        code: Option<String>,
        kind: Option<String>,
        message: String,
    },

    /// Network failure while connecting or reading the body.
    #[error("transport error: {0}")]
    Transport(String),

    /// The body was not a valid event stream of chunk objects.
    #[error("malformed upstream stream: {0}")]
    Protocol(String),
}

impl UpstreamError {
    /// HTTP status code of the failed upstream response, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Provider error code (e.g. `invalid_api_key`), if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Status { code, .. } | Self::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Provider error type (e.g. `authentication_error`), if any.
    pub fn kind(&self) -> Option<&str> {
        match self {
            Self::Status { kind, .. } | Self::Api { kind, .. } => kind.as_deref(),
            _ => None,
        }
    }

    /// Build a [`UpstreamError::Status`] from a failed response body.
    ///
    /// OpenAI-style bodies (`{"error": {...}}`) are unpacked; anything else
    /// becomes the message verbatim.
    pub fn from_status(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => Self::Status {
                status,
                code: envelope.error.code.map(code_to_string),
                kind: envelope.error.kind,
                message: envelope.error.message,
            },
            Err(_) => Self::Status {
                status,
                code: None,
                kind: None,
                message: if body.trim().is_empty() {
                    format!("HTTP {status}")
                } else {
                    body.trim().to_string()
                },
            },
        }
    }
}

// ─── Wire Types ────────────────────────────────────────────────────────────

/// Streaming chat completion request body.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub max_tokens: u32,
    pub temperature: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatCompletionRequest {
    /// A single-turn streaming request for `prompt`.
    pub fn for_prompt(variant: ModelVariant, prompt: &Prompt) -> Self {
        Self {
            model: variant.model_id().to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.as_str().to_string(),
            }],
            stream: true,
            max_tokens: variant.max_tokens(),
            temperature: variant.temperature(),
        }
    }
}

/// The incremental payload of one streamed choice.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

// Some providers send numeric codes.
fn code_to_string(code: serde_json::Value) -> String {
    match code {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

/// One decoded unit of the upstream event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    /// A chunk; either field may be absent or empty.
    Delta(ChunkDelta),
    /// The `[DONE]` sentinel.
    Done,
}

/// Decode the `data` payload of one upstream SSE event.
pub fn parse_event_data(data: &str) -> Result<UpstreamEvent, UpstreamError> {
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(UpstreamEvent::Done);
    }

    let chunk: StreamChunk =
        serde_json::from_str(data).map_err(|e| UpstreamError::Protocol(e.to_string()))?;

    if let Some(error) = chunk.error {
        return Err(UpstreamError::Api {
            code: error.code.map(code_to_string),
            kind: error.kind,
            message: error.message,
        });
    }

    let delta = chunk
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.delta)
        .unwrap_or_default();

    Ok(UpstreamEvent::Delta(delta))
}

// ─── Chunk Source ──────────────────────────────────────────────────────────

/// Ordered stream of decoded upstream events.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<UpstreamEvent, UpstreamError>> + Send>>;

/// Something that can open a streaming chat completion.
#[async_trait]
pub trait ChunkSource: Send + Sync {
    async fn open(&self, request: &ChatCompletionRequest) -> Result<ChunkStream, UpstreamError>;
}

/// HTTP client for the configured provider.
pub struct UpstreamClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChunkSource for UpstreamClient {
    async fn open(&self, request: &ChatCompletionRequest) -> Result<ChunkStream, UpstreamError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::from_status(status.as_u16(), &body));
        }

        debug!(endpoint = %self.endpoint, "Upstream stream opened");

        let events = response.bytes_stream().eventsource().map(|event| match event {
            Ok(event) => parse_event_data(&event.data),
            Err(eventsource_stream::EventStreamError::Transport(e)) => {
                Err(UpstreamError::Transport(e.to_string()))
            }
            Err(e) => Err(UpstreamError::Protocol(e.to_string())),
        });

        Ok(Box::pin(events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_delta() {
        let data = r#"{"id":"x","choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]}"#;
        let event = parse_event_data(data).unwrap();
        assert_eq!(
            event,
            UpstreamEvent::Delta(ChunkDelta {
                content: Some("Hi".into()),
                reasoning_content: None,
            })
        );
    }

    #[test]
    fn test_parse_reasoning_delta_with_null_content() {
        let data = r#"{"choices":[{"delta":{"content":null,"reasoning_content":"think"}}]}"#;
        match parse_event_data(data).unwrap() {
            UpstreamEvent::Delta(delta) => {
                assert_eq!(delta.content, None);
                assert_eq!(delta.reasoning_content.as_deref(), Some("think"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_parse_done_and_usage_only() {
        assert_eq!(parse_event_data(" [DONE] ").unwrap(), UpstreamEvent::Done);

        let usage = r#"{"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":1}}"#;
        assert_eq!(
            parse_event_data(usage).unwrap(),
            UpstreamEvent::Delta(ChunkDelta::default())
        );
    }

    #[test]
    fn test_parse_in_stream_error() {
        let data = r#"{"error":{"message":"overloaded","type":"server_error","code":503}}"#;
        let err = parse_event_data(data).unwrap_err();
        assert_eq!(err.code(), Some("503"));
        assert_eq!(err.kind(), Some("server_error"));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_parse_garbage_is_protocol_error() {
        assert!(matches!(
            parse_event_data("{not json"),
            Err(UpstreamError::Protocol(_))
        ));
    }

    #[test]
    fn test_status_error_from_json_body() {
        let body = r#"{"error":{"message":"Authentication Fails","type":"authentication_error","code":"invalid_request_error"}}"#;
        let err = UpstreamError::from_status(401, body);
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.kind(), Some("authentication_error"));
        assert_eq!(err.code(), Some("invalid_request_error"));
        assert_eq!(err.to_string(), "upstream returned HTTP 401: Authentication Fails");
    }

    #[test]
    fn test_status_error_from_plain_body() {
        let err = UpstreamError::from_status(502, "");
        assert_eq!(err.to_string(), "upstream returned HTTP 502: HTTP 502");
        assert_eq!(err.code(), None);
    }

    #[test]
    fn test_request_body_shape() {
        let prompt = Prompt::new("hello").unwrap();
        let req = ChatCompletionRequest::for_prompt(ModelVariant::Reasoner, &prompt);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "deepseek-reasoner");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hello");
        assert_eq!(json["stream"], true);
        assert_eq!(json["max_tokens"], 2000);
        assert_eq!(json["temperature"], 0.7);
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let config = UpstreamConfig {
            api_key: "k".into(),
            base_url: "http://localhost:9/v1/".into(),
            connect_timeout_secs: 5,
        };
        let client = UpstreamClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9/v1/chat/completions");
    }
}
