//! Streaming relay: upstream chat completion → downstream fragment sink.
//!
//! - [`upstream`]: Wire types, SSE decoding and the HTTP client
//! - [`console`]: Terminal sink with per-channel section headers
//!
//! The HTTP/SSE sink lives in [`crate::server::streaming`].

pub mod console;
pub mod upstream;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use upstream::{ChatCompletionRequest, ChunkSource, UpstreamError, UpstreamEvent};

/// Supported upstream model variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModelVariant {
    /// Plain chat model, content channel only.
    Chat,
    /// Reasoning model, emits reasoning before content.
    Reasoner,
}

impl ModelVariant {
    pub fn model_id(self) -> &'static str {
        match self {
            Self::Chat => "deepseek-chat",
            Self::Reasoner => "deepseek-reasoner",
        }
    }

    pub fn max_tokens(self) -> u32 {
        match self {
            Self::Chat => 1000,
            Self::Reasoner => 2000,
        }
    }

    pub fn temperature(self) -> f64 {
        0.7
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model_id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("prompt must not be empty")]
pub struct EmptyPromptError;

/// A non-empty user prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt(String);

impl Prompt {
    pub fn new(text: impl Into<String>) -> Result<Self, EmptyPromptError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(EmptyPromptError);
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Which upstream channel a fragment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentTag {
    Reasoning,
    Content,
}

impl fmt::Display for FragmentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reasoning => f.write_str("reasoning"),
            Self::Content => f.write_str("content"),
        }
    }
}

/// A piece of streamed text, borrowed from the chunk it arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment<'a> {
    pub tag: FragmentTag,
    pub text: &'a str,
}

/// Terminal status of a relay session.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayStatus {
    Completed,
    Failed(UpstreamError),
}

/// Summary returned once the upstream stream is exhausted or has failed.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayOutcome {
    /// Characters of content forwarded.
    pub content_chars: usize,
    /// Characters of reasoning forwarded.
    pub reasoning_chars: usize,
    pub status: RelayStatus,
}

impl RelayOutcome {
    pub fn total_chars(&self) -> usize {
        self.content_chars + self.reasoning_chars
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, RelayStatus::Completed)
    }

    /// Whether any fragment reached the sink before the session ended.
    pub fn forwarded_any(&self) -> bool {
        self.total_chars() > 0
    }
}

/// Downstream consumer of relayed fragments.
///
/// Sinks handle their own I/O failures; a sink that can no longer deliver
/// does not stop the relay.
#[async_trait]
pub trait FragmentSink: Send {
    /// Called once per non-empty fragment, in arrival order.
    async fn emit(&mut self, fragment: Fragment<'_>);

    /// Called exactly once after the terminal status is known.
    async fn finish(&mut self, _outcome: &RelayOutcome) {}
}

/// Relays one prompt at a time from a [`ChunkSource`] to a [`FragmentSink`].
///
/// Cheap to share: concurrent sessions hold an `Arc` and keep no mutable
/// state here.
#[derive(Clone)]
pub struct StreamRelay {
    source: Arc<dyn ChunkSource>,
    variant: ModelVariant,
}

impl StreamRelay {
    pub fn new(source: Arc<dyn ChunkSource>, variant: ModelVariant) -> Self {
        Self { source, variant }
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    /// Run one relay session to completion or failure.
    pub async fn relay<K>(&self, prompt: &Prompt, sink: &mut K) -> RelayOutcome
    where
        K: FragmentSink + ?Sized,
    {
        let session = Uuid::new_v4();
        let request = ChatCompletionRequest::for_prompt(self.variant, prompt);

        info!(
            session = %session,
            model = %self.variant,
            prompt_chars = prompt.as_str().chars().count(),
            "Relay session started"
        );

        let mut content_chars = 0;
        let mut reasoning_chars = 0;

        let status = match self.source.open(&request).await {
            Err(e) => RelayStatus::Failed(e),
            Ok(mut stream) => loop {
                match stream.next().await {
                    None | Some(Ok(UpstreamEvent::Done)) => break RelayStatus::Completed,
                    Some(Err(e)) => break RelayStatus::Failed(e),
                    Some(Ok(UpstreamEvent::Delta(delta))) => {
                        let reasoning = delta.reasoning_content.as_deref();
                        if let Some(text) = reasoning.filter(|t| !t.is_empty()) {
                            reasoning_chars += text.chars().count();
                            sink.emit(Fragment {
                                tag: FragmentTag::Reasoning,
                                text,
                            })
                            .await;
                        }
                        if let Some(text) = delta.content.as_deref().filter(|t| !t.is_empty()) {
                            content_chars += text.chars().count();
                            sink.emit(Fragment {
                                tag: FragmentTag::Content,
                                text,
                            })
                            .await;
                        }
                        debug!(
                            session = %session,
                            content_chars,
                            reasoning_chars,
                            "Chunk forwarded"
                        );
                    }
                }
            },
        };

        let outcome = RelayOutcome {
            content_chars,
            reasoning_chars,
            status,
        };

        match &outcome.status {
            RelayStatus::Completed => info!(
                session = %session,
                content_chars,
                reasoning_chars,
                "Relay session completed"
            ),
            RelayStatus::Failed(e) => warn!(
                session = %session,
                status = ?e.status(),
                code = ?e.code(),
                content_chars,
                reasoning_chars,
                "Relay session failed: {e}"
            ),
        }

        sink.finish(&outcome).await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use upstream::{ChunkDelta, ChunkStream};

    struct Scripted(Vec<Result<UpstreamEvent, UpstreamError>>);

    #[async_trait]
    impl ChunkSource for Scripted {
        async fn open(&self, _: &ChatCompletionRequest) -> Result<ChunkStream, UpstreamError> {
            Ok(Box::pin(futures::stream::iter(self.0.clone())))
        }
    }

    struct FailingOpen;

    #[async_trait]
    impl ChunkSource for FailingOpen {
        async fn open(&self, _: &ChatCompletionRequest) -> Result<ChunkStream, UpstreamError> {
            Err(UpstreamError::from_status(429, "slow down"))
        }
    }

    #[derive(Default)]
    struct Recorder {
        fragments: Vec<(FragmentTag, String)>,
        finished: Vec<RelayOutcome>,
    }

    #[async_trait]
    impl FragmentSink for Recorder {
        async fn emit(&mut self, fragment: Fragment<'_>) {
            self.fragments.push((fragment.tag, fragment.text.to_string()));
        }

        async fn finish(&mut self, outcome: &RelayOutcome) {
            self.finished.push(outcome.clone());
        }
    }

    fn delta(reasoning: Option<&str>, content: Option<&str>) -> Result<UpstreamEvent, UpstreamError> {
        Ok(UpstreamEvent::Delta(ChunkDelta {
            content: content.map(String::from),
            reasoning_content: reasoning.map(String::from),
        }))
    }

    #[test]
    fn test_prompt_rejects_blank() {
        assert_eq!(Prompt::new(""), Err(EmptyPromptError));
        assert_eq!(Prompt::new("  \n"), Err(EmptyPromptError));
        assert_eq!(Prompt::new("2+2=?").unwrap().as_str(), "2+2=?");
    }

    #[tokio::test]
    async fn test_forwards_in_arrival_order() {
        let relay = StreamRelay::new(
            Arc::new(Scripted(vec![
                delta(Some("Let me"), None),
                delta(Some(" think"), Some("")),
                delta(None, Some("Sky ")),
                delta(None, None),
                delta(None, Some("is blue")),
                Ok(UpstreamEvent::Done),
            ])),
            ModelVariant::Reasoner,
        );
        let mut sink = Recorder::default();
        let outcome = relay.relay(&Prompt::new("why").unwrap(), &mut sink).await;

        assert_eq!(
            sink.fragments,
            vec![
                (FragmentTag::Reasoning, "Let me".to_string()),
                (FragmentTag::Reasoning, " think".to_string()),
                (FragmentTag::Content, "Sky ".to_string()),
                (FragmentTag::Content, "is blue".to_string()),
            ]
        );
        assert_eq!(outcome.reasoning_chars, 12);
        assert_eq!(outcome.content_chars, 11);
        assert!(outcome.is_completed());
        assert_eq!(sink.finished, vec![outcome]);
    }

    #[tokio::test]
    async fn test_counts_characters_not_bytes() {
        let relay = StreamRelay::new(
            Arc::new(Scripted(vec![delta(None, Some("天空蓝"))])),
            ModelVariant::Chat,
        );
        let outcome = relay.relay(&Prompt::new("q").unwrap(), &mut Recorder::default()).await;
        assert_eq!(outcome.content_chars, 3);
        assert!(outcome.is_completed());
    }

    #[tokio::test]
    async fn test_stops_at_done_sentinel() {
        let relay = StreamRelay::new(
            Arc::new(Scripted(vec![
                delta(None, Some("a")),
                Ok(UpstreamEvent::Done),
                delta(None, Some("ignored")),
            ])),
            ModelVariant::Chat,
        );
        let mut sink = Recorder::default();
        let outcome = relay.relay(&Prompt::new("q").unwrap(), &mut sink).await;
        assert_eq!(sink.fragments.len(), 1);
        assert_eq!(outcome.content_chars, 1);
    }

    #[tokio::test]
    async fn test_mid_stream_error_keeps_partial_output() {
        let relay = StreamRelay::new(
            Arc::new(Scripted(vec![
                delta(None, Some("partial")),
                Err(UpstreamError::Transport("connection reset".into())),
                delta(None, Some("never")),
            ])),
            ModelVariant::Chat,
        );
        let mut sink = Recorder::default();
        let outcome = relay.relay(&Prompt::new("q").unwrap(), &mut sink).await;

        assert_eq!(sink.fragments, vec![(FragmentTag::Content, "partial".to_string())]);
        assert_eq!(
            outcome.status,
            RelayStatus::Failed(UpstreamError::Transport("connection reset".into()))
        );
        assert!(outcome.forwarded_any());
        assert_eq!(sink.finished.len(), 1);
    }

    #[tokio::test]
    async fn test_open_failure_surfaces_status() {
        let relay = StreamRelay::new(Arc::new(FailingOpen), ModelVariant::Chat);
        let mut sink = Recorder::default();
        let outcome = relay.relay(&Prompt::new("q").unwrap(), &mut sink).await;

        assert!(sink.fragments.is_empty());
        assert!(!outcome.forwarded_any());
        match outcome.status {
            RelayStatus::Failed(e) => assert_eq!(e.status(), Some(429)),
            RelayStatus::Completed => panic!("expected failure"),
        }
    }
}
