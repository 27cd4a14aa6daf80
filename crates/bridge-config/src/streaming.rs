use serde::Deserialize;

/// Tuning for the streaming translator
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamingConfig {
    /// Characters emitted one at a time before switching to whole blocks
    #[serde(default = "default_char_budget")]
    pub char_budget: usize,
    /// Capacity of the hand-off queue between producer task and response body
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            char_budget: default_char_budget(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

const fn default_char_budget() -> usize {
    1000
}

const fn default_channel_capacity() -> usize {
    32
}
