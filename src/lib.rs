//! deepseek-relay: stream chat completions from an OpenAI-compatible API.
//!
//! Opens one streaming chat-completion request per prompt and relays each
//! text fragment, in arrival order, to a terminal or to a browser over
//! Server-Sent Events.

pub mod config;
pub mod demo;
pub mod relay;
pub mod server;
