use std::net::SocketAddr;
use std::path::PathBuf;

use bridge_config::Config;
use clap::Parser;

/// Config file read when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "bridge.toml";

/// OpenAI-compatible gateway for the Gemini API
#[derive(Debug, Parser)]
#[command(name = "bridge", about = "Serve the OpenAI chat completions API on top of Gemini")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, env = "BRIDGE_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "BRIDGE_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Pass model names through to Gemini instead of mapping `OpenAI` names
    #[arg(long, env = "DISABLE_MODEL_MAPPING")]
    pub disable_model_mapping: bool,

    /// Backend model served for `gpt-4-vision-preview`
    #[arg(long, env = "GPT_4_VISION_PREVIEW")]
    pub vision_model: Option<String>,

    /// Log filter directive, e.g. `info` or `bridge_llm=debug,info`
    #[arg(long, default_value = "info", env = "BRIDGE_LOG")]
    pub log_filter: String,
}

impl Args {
    /// Load the config file and apply command line overrides
    ///
    /// A missing file at the default path means built-in defaults; a missing
    /// file that was asked for explicitly is an error.
    pub fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = if self.config.as_os_str() == DEFAULT_CONFIG_PATH && !self.config.exists() {
            Config::default()
        } else {
            Config::load(&self.config)?
        };

        if let Some(listen) = self.listen {
            config.server.listen_address = Some(listen);
        }

        if self.disable_model_mapping {
            config.models.mapping = false;
        }

        if let Some(vision_model) = &self.vision_model {
            config.models.vision_model = Some(vision_model.clone());
        }

        config.validate()?;

        Ok(config)
    }
}
