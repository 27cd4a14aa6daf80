#![allow(clippy::must_use_candidate)]

pub mod backend;
pub mod cors;
mod env;
pub mod health;
mod loader;
pub mod models;
pub mod server;
pub mod streaming;
pub mod telemetry;

use serde::Deserialize;

pub use backend::*;
pub use cors::*;
pub use health::*;
pub use models::*;
pub use server::*;
pub use streaming::*;
pub use telemetry::*;

/// Top-level gateway configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Backend (Gemini API) connection settings
    #[serde(default)]
    pub backend: BackendConfig,
    /// Outward model name mapping
    #[serde(default)]
    pub models: ModelsConfig,
    /// Streaming translation tuning
    #[serde(default)]
    pub streaming: StreamingConfig,
    /// Logging and OTLP export
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}
