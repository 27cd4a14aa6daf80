//! Programmatic configuration builder for integration tests

use std::net::SocketAddr;

use bridge_config::{BackendConfig, Config, ServerConfig};

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a builder whose backend points at the given mock
    pub fn new(backend_url: &str) -> Self {
        Self {
            config: Config {
                server: ServerConfig {
                    listen_address: Some(SocketAddr::from(([127, 0, 0, 1], 0))),
                    ..ServerConfig::default()
                },
                backend: BackendConfig {
                    base_url: backend_url.parse().expect("valid URL"),
                    ..BackendConfig::default()
                },
                ..Config::default()
            },
        }
    }

    /// Pass model names through unchanged
    pub fn without_mapping(mut self) -> Self {
        self.config.models.mapping = false;
        self
    }

    /// Override the backend model used for vision requests
    pub fn with_vision_model(mut self, model: &str) -> Self {
        self.config.models.vision_model = Some(model.to_owned());
        self
    }

    /// Set the one-character-per-chunk budget
    pub fn with_char_budget(mut self, budget: usize) -> Self {
        self.config.streaming.char_budget = budget;
        self
    }

    /// Build the final config
    pub fn build(self) -> Config {
        self.config.validate().expect("valid test config");
        self.config
    }
}
