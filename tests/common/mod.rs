//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use deepseek_relay::relay::upstream::{
    ChatCompletionRequest, ChunkDelta, ChunkSource, ChunkStream, UpstreamError, UpstreamEvent,
};

/// In-memory upstream that replays a fixed script and records requests.
pub struct ScriptedSource {
    open_error: Option<UpstreamError>,
    script: Vec<Result<UpstreamEvent, UpstreamError>>,
    pub requests: Mutex<Vec<ChatCompletionRequest>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<UpstreamEvent, UpstreamError>>) -> Arc<Self> {
        Arc::new(Self {
            open_error: None,
            script,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(error: UpstreamError) -> Arc<Self> {
        Arc::new(Self {
            open_error: Some(error),
            script: Vec::new(),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChunkSource for ScriptedSource {
    async fn open(&self, request: &ChatCompletionRequest) -> Result<ChunkStream, UpstreamError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(e) = &self.open_error {
            return Err(e.clone());
        }
        Ok(Box::pin(futures::stream::iter(self.script.clone())))
    }
}

/// Upstream that streams the prompt back one character per chunk, yielding
/// to the scheduler between chunks.
pub struct EchoSource;

#[async_trait]
impl ChunkSource for EchoSource {
    async fn open(&self, request: &ChatCompletionRequest) -> Result<ChunkStream, UpstreamError> {
        let chars: Vec<String> = request.messages[0].content.chars().map(String::from).collect();
        let deltas = futures::stream::iter(chars).then(|c| async move {
            tokio::task::yield_now().await;
            content(&c)
        });
        Ok(Box::pin(deltas.chain(futures::stream::once(async { done() }))))
    }
}

pub fn content(text: &str) -> Result<UpstreamEvent, UpstreamError> {
    Ok(UpstreamEvent::Delta(ChunkDelta {
        content: Some(text.to_string()),
        reasoning_content: None,
    }))
}

pub fn reasoning(text: &str) -> Result<UpstreamEvent, UpstreamError> {
    Ok(UpstreamEvent::Delta(ChunkDelta {
        content: None,
        reasoning_content: Some(text.to_string()),
    }))
}

pub fn done() -> Result<UpstreamEvent, UpstreamError> {
    Ok(UpstreamEvent::Done)
}

/// Frame raw `data:` payloads as an SSE body.
pub fn sse_body(events: &[&str]) -> String {
    events.iter().map(|e| format!("data: {e}\n\n")).collect()
}

/// An OpenAI-style streaming chunk carrying a content delta.
pub fn content_chunk(text: &str) -> String {
    serde_json::json!({
        "id": "chatcmpl-test",
        "object": "chat.completion.chunk",
        "model": "deepseek-chat",
        "choices": [{"index": 0, "delta": {"content": text}, "finish_reason": null}]
    })
    .to_string()
}

/// A reasoner chunk carrying a reasoning delta and null content.
pub fn reasoning_chunk(text: &str) -> String {
    serde_json::json!({
        "id": "chatcmpl-test",
        "object": "chat.completion.chunk",
        "model": "deepseek-reasoner",
        "choices": [{"index": 0, "delta": {"content": null, "reasoning_content": text}, "finish_reason": null}]
    })
    .to_string()
}
