//! HTTP server relaying chat completions to browsers.
//!
//! - [`chat_api`]: Router, request types and route handlers
//! - [`streaming`]: SSE sink for token-by-token responses

pub mod chat_api;
pub mod streaming;
