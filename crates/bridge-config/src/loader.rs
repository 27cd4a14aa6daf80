use std::path::Path;

use crate::{AnyOrList, Config};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a placeholder cannot be
    /// resolved, the TOML is malformed, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Config::load`], minus file access
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error on zero-sized streaming limits, an empty vision
    /// model override, or a credentialed CORS policy with wildcards
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.streaming.char_budget == 0 {
            anyhow::bail!("streaming.char_budget must be greater than 0");
        }

        if self.streaming.channel_capacity == 0 {
            anyhow::bail!("streaming.channel_capacity must be greater than 0");
        }

        if self.models.vision_model.as_deref().is_some_and(|m| m.trim().is_empty()) {
            anyhow::bail!("models.vision_model must not be empty when set");
        }

        if !self.server.health.path.starts_with('/') {
            anyhow::bail!("server.health.path must start with '/'");
        }

        if let Some(cors) = &self.server.cors
            && cors.credentials
            && [&cors.origins, &cors.methods, &cors.headers].contains(&&AnyOrList::Any)
        {
            anyhow::bail!("server.cors.credentials requires explicit origins, methods and headers");
        }

        Ok(())
    }
}
