use std::time::Duration;

use serde::{Deserialize, Deserializer};
use url::Url;

/// Default Generative Language API base URL
pub const DEFAULT_BACKEND_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Connection settings for the Gemini backend
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// API base URL, including the version segment
    #[serde(default = "default_base_url")]
    pub base_url: Url,
    /// TCP connect timeout for backend and image requests
    #[serde(default = "default_connect_timeout", deserialize_with = "human_duration")]
    pub connect_timeout: Duration,
    /// Overall timeout for non-streaming backend calls
    #[serde(default = "default_request_timeout", deserialize_with = "human_duration")]
    pub request_timeout: Duration,
    /// Longest gap tolerated between two frames of a streamed reply
    #[serde(default = "default_stream_idle_timeout", deserialize_with = "human_duration")]
    pub stream_idle_timeout: Duration,
    /// Overall timeout for fetching a remote image part
    #[serde(default = "default_image_timeout", deserialize_with = "human_duration")]
    pub image_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            stream_idle_timeout: default_stream_idle_timeout(),
            image_timeout: default_image_timeout(),
        }
    }
}

#[allow(clippy::expect_used)]
fn default_base_url() -> Url {
    Url::parse(DEFAULT_BACKEND_URL).expect("valid default URL")
}

const fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

const fn default_request_timeout() -> Duration {
    Duration::from_secs(120)
}

const fn default_stream_idle_timeout() -> Duration {
    Duration::from_secs(60)
}

const fn default_image_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Deserialize durations written as `"30s"`, `"2m"` or `"1m 30s"`
fn human_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    duration_str::parse(&raw).map_err(|e| serde::de::Error::custom(format!("invalid duration '{raw}': {e}")))
}
