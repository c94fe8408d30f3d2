//! Runtime configuration for deepseek-relay.
//!
//! Settings come from the process environment and are overridden by
//! command-line flags. The resulting [`Config`] is built once in `main` and
//! passed by value into the relay and server constructors.

use std::fmt;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;

use crate::relay::ModelVariant;

/// Upstream credential (required).
pub const API_KEY_VAR: &str = "DEEPSEEK_API_KEY";
/// Upstream base URL override.
pub const BASE_URL_VAR: &str = "DEEPSEEK_BASE_URL";
pub const HOST_VAR: &str = "HOST";
pub const PORT_VAR: &str = "PORT";
pub const STATIC_DIR_VAR: &str = "STATIC_DIR";

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "deepseek-relay",
    version,
    about = "Stream DeepSeek chat completions to a terminal or over Server-Sent Events"
)]
pub struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve the chat page and the SSE chat API.
    Serve(ServeArgs),

    /// Stream an answer from the chat model to the terminal.
    Chat(DemoArgs),

    /// Stream reasoning and answer from the reasoning model to the terminal.
    Reason(DemoArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Listen host (overrides $HOST).
    #[arg(long)]
    pub host: Option<String>,

    /// Listen port (overrides $PORT).
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory containing chat.html (overrides $STATIC_DIR).
    #[arg(long)]
    pub static_dir: Option<PathBuf>,

    /// Upstream model used for /api/chat.
    #[arg(long, value_enum, default_value = "chat")]
    pub model: ModelVariant,
}

#[derive(Args, Debug, Clone)]
pub struct DemoArgs {
    /// Prompt to send; a built-in question is used when omitted.
    pub prompt: Option<String>,

    /// After the first prompt, run the canned batch of questions.
    #[arg(long)]
    pub batch: bool,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("environment variable DEEPSEEK_API_KEY is not set")]
    MissingApiKey,

    #[error("invalid PORT value {0:?}: expected a port number")]
    InvalidPort(String),
}

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub upstream: UpstreamConfig,
    pub server: ServerConfig,
}

/// Upstream provider settings. Shared read-only by every relay session.
#[derive(Clone)]
pub struct UpstreamConfig {
    pub api_key: String,

    /// Base URL without the `/chat/completions` suffix.
    pub base_url: String,

    /// TCP connect timeout in seconds. The stream itself has no deadline.
    pub connect_timeout_secs: u64,
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Directory the chat page is served from.
    pub static_dir: PathBuf,

    /// Capacity of the per-request fragment channel.
    pub event_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            static_dir: PathBuf::from("static"),
            event_buffer: 64,
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = non_empty(API_KEY_VAR).ok_or(ConfigError::MissingApiKey)?;

        let mut server = ServerConfig::default();
        if let Some(host) = non_empty(HOST_VAR) {
            server.host = host;
        }
        if let Some(port) = non_empty(PORT_VAR) {
            server.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
        }
        if let Some(dir) = non_empty(STATIC_DIR_VAR) {
            server.static_dir = PathBuf::from(dir);
        }

        Ok(Self {
            upstream: UpstreamConfig {
                api_key: api_key.trim().to_string(),
                base_url: non_empty(BASE_URL_VAR).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                connect_timeout_secs: 30,
            },
            server,
        })
    }

    /// Apply `serve` flags on top of the environment.
    pub fn with_serve_args(mut self, args: &ServeArgs) -> Self {
        if let Some(host) = &args.host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(dir) = &args.static_dir {
            self.server.static_dir = dir.clone();
        }
        self
    }
}
