//! HTTP server assembly for the bridge gateway

mod cors;
mod request_context;

use std::net::SocketAddr;

use axum::Router;
use bridge_config::{Config, CorsConfig};
use bridge_llm::LlmState;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Assembled server with all routes and middleware
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
    /// Cancelled when shutdown begins so open streams end promptly
    streams: CancellationToken,
}

impl Server {
    /// Build the server from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the backend HTTP client cannot be constructed
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let streams = CancellationToken::new();

        let llm_state = LlmState::from_config(
            &config.backend,
            &config.models,
            config.streaming.clone(),
            streams.clone(),
        )?;

        tracing::info!(
            backend = %config.backend.base_url,
            mapping = config.models.mapping,
            vision_model = config.models.vision_model.as_deref().unwrap_or("default"),
            "gateway configured"
        );

        Ok(Self::with_state(config, llm_state, streams))
    }

    /// Build the server around an existing handler state
    pub fn with_state(config: &Config, llm_state: LlmState, streams: CancellationToken) -> Self {
        let mut app = Router::new();

        if config.server.health.enabled {
            app = app.route(&config.server.health.path, axum::routing::get(|| async { "ok" }));
        }

        app = app.merge(bridge_llm::llm_router(llm_state));

        // Apply middleware layers (innermost first)
        app = app.layer(axum::middleware::from_fn(request_context::request_context_middleware));
        app = app.layer(TraceLayer::new_for_http());

        let default_cors = CorsConfig::default();
        app = app.layer(cors::cors_layer(config.server.cors.as_ref().unwrap_or(&default_cors)));

        Self {
            router: app,
            listen_address: config.server.listen_address(),
            streams,
        }
    }

    /// Get the configured listen address
    #[must_use]
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Start serving requests
    ///
    /// Blocks until the cancellation token is triggered. In-flight streams
    /// are told to finish before connections drain.
    ///
    /// # Errors
    ///
    /// Returns an error if binding the TCP listener or serving fails
    pub async fn serve(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "server listening");

        let streams = self.streams;

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated");
                streams.cancel();
            })
            .await?;

        Ok(())
    }
}
