//! SSE (Server-Sent Events) sink for relayed fragments.
//!
//! The relay task pushes [`RelayEvent`]s into a bounded channel; the HTTP
//! handler turns the receiving end into an SSE stream of
//! `data: {"content": ...}` events closed by `data: [DONE]`.

use std::convert::Infallible;

use async_trait::async_trait;
use axum::response::sse::Event;
use futures::stream::Stream;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::debug;

use crate::relay::{Fragment, FragmentSink, FragmentTag, RelayOutcome};

/// What the relay task reports to the HTTP handler.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    Content(String),
    Finished(RelayOutcome),
}

/// SSE payload for one content fragment.
#[derive(Debug, Serialize)]
pub struct ContentFrame<'a> {
    pub content: &'a str,
}

/// Forwards content fragments into a channel drained by the response body.
pub struct EventSink {
    tx: mpsc::Sender<RelayEvent>,
    detached: bool,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<RelayEvent>) -> Self {
        Self { tx, detached: false }
    }

    async fn send(&mut self, event: RelayEvent) {
        if self.tx.send(event).await.is_err() && !self.detached {
            // The client went away; the relay still runs to the end.
            debug!("SSE client disconnected, discarding remaining fragments");
            self.detached = true;
        }
    }
}

#[async_trait]
impl FragmentSink for EventSink {
    async fn emit(&mut self, fragment: Fragment<'_>) {
        if fragment.tag == FragmentTag::Content && !self.detached {
            self.send(RelayEvent::Content(fragment.text.to_string())).await;
        }
    }

    async fn finish(&mut self, outcome: &RelayOutcome) {
        if !self.detached {
            self.send(RelayEvent::Finished(outcome.clone())).await;
        }
    }
}

/// Convert one relay event into its SSE frame.
///
/// A failed outcome yields no frame: the response simply ends without the
/// `[DONE]` sentinel.
pub fn relay_event_to_sse(event: RelayEvent) -> Option<Event> {
    match event {
        RelayEvent::Content(text) => {
            let data = serde_json::to_string(&ContentFrame { content: &text }).unwrap_or_default();
            Some(Event::default().data(data))
        }
        RelayEvent::Finished(outcome) if outcome.is_completed() => Some(Event::default().data("[DONE]")),
        RelayEvent::Finished(_) => None,
    }
}

/// Build the SSE body from the first (already received) event and the rest
/// of the channel.
pub fn relay_events_to_sse_stream(
    first: RelayEvent,
    rx: mpsc::Receiver<RelayEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    tokio_stream::once(first)
        .chain(ReceiverStream::new(rx))
        .filter_map(|event| relay_event_to_sse(event).map(Ok))
}
