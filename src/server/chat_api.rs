//! Chat front door.
//!
//! - POST /api/chat
//! - GET / and /chat (static chat page)
//! - OPTIONS on any path (CORS preflight)
//! - 404 JSON for everything else

use std::path::Path;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, post};
use axum::{Json, Router};
use mime_guess::mime::{self, Mime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tower::ServiceExt;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::relay::{EmptyPromptError, Prompt, RelayOutcome, RelayStatus, StreamRelay};
use crate::server::streaming::{relay_events_to_sse_stream, EventSink, RelayEvent};

pub const CHAT_PAGE: &str = "chat.html";

/// Application state shared across handlers.
pub struct AppState {
    pub relay: StreamRelay,
    pub config: Arc<Config>,
}

/// Build the axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/chat", post(chat).fallback(not_found))
        .route("/", any(chat_page))
        .route("/chat", any(chat_page))
        .fallback(not_found)
        .with_state(state)
        .layer(cors)
        .layer(middleware::from_fn(preflight))
        .layer(TraceLayer::new_for_http())
}

// ─── Request/Response Types ────────────────────────────────────────────────

/// Body of `POST /api/chat`.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Errors returned to HTTP callers as `{"error": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    #[error(transparent)]
    EmptyPrompt(#[from] EmptyPromptError),

    #[error("upstream request failed")]
    Upstream,

    #[error("endpoint not found")]
    NotFound,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            // Unparseable bodies are reported as a server error.
            Self::InvalidBody(_) | Self::Upstream => StatusCode::INTERNAL_SERVER_ERROR,
            Self::EmptyPrompt(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (self.status(), body).into_response()
    }
}

// ─── Route Handlers ────────────────────────────────────────────────────────

/// Relay a chat message as an SSE stream.
///
/// The response is committed only after the first relay event arrives, so a
/// failure before any content still becomes a JSON 500.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let req: ChatRequest =
        serde_json::from_slice(&body).inspect_err(|e| warn!("Rejected chat body: {e}"))?;
    let prompt = Prompt::new(req.message)?;

    info!(
        model = %state.relay.variant(),
        message_chars = prompt.as_str().chars().count(),
        "Chat request"
    );

    let (tx, mut rx) = mpsc::channel(state.config.server.event_buffer.max(1));
    let relay = state.relay.clone();
    tokio::spawn(async move {
        let mut sink = EventSink::new(tx);
        relay.relay(&prompt, &mut sink).await;
    });

    let first = match rx.recv().await {
        Some(RelayEvent::Finished(RelayOutcome {
            status: RelayStatus::Failed(e),
            ..
        })) => {
            error!(status = ?e.status(), "Chat relay failed before any content: {e}");
            return Err(ApiError::Upstream);
        }
        Some(event) => event,
        None => {
            error!("Relay task ended without reporting an outcome");
            return Err(ApiError::Upstream);
        }
    };

    let stream = relay_events_to_sse_stream(first, rx);
    let mut response = Sse::new(stream).keep_alive(KeepAlive::default()).into_response();
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("content-type"),
    );
    Ok(response)
}

/// Serve the chat page from the static directory, whatever the method.
pub async fn chat_page(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let path = state.config.server.static_dir.join(CHAT_PAGE);

    let (mut parts, _) = req.into_parts();
    if parts.method != Method::HEAD {
        parts.method = Method::GET;
    }
    let req = Request::from_parts(parts, Body::empty());

    let response = match ServeFile::new_with_mime(&path, &mime_for(&path)).oneshot(req).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    if response.status() == StatusCode::NOT_FOUND {
        warn!(path = %path.display(), "Static file unavailable");
        return (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "file not found",
        )
            .into_response();
    }
    response.map(Body::new)
}

// HTML is always served as UTF-8.
fn mime_for(path: &Path) -> Mime {
    let mime = mime_guess::from_path(path).first_or_text_plain();
    if mime == mime::TEXT_HTML {
        mime::TEXT_HTML_UTF_8
    } else {
        mime
    }
}

/// Answer every `OPTIONS` request, whatever the path, as a CORS preflight.
pub async fn preflight(req: Request, next: Next) -> Response {
    if req.method() != Method::OPTIONS {
        return next.run(req).await;
    }

    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
        ],
    )
        .into_response()
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
