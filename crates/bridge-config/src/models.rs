use serde::Deserialize;

/// Outward model naming behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelsConfig {
    /// Translate OpenAI model names (`gpt-4`, ...) to Gemini models and back
    ///
    /// When disabled, clients send Gemini model names directly and responses
    /// echo them unchanged.
    #[serde(default = "default_mapping")]
    pub mapping: bool,
    /// Backend model used for the vision alias instead of the default
    #[serde(default)]
    pub vision_model: Option<String>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            mapping: default_mapping(),
            vision_model: None,
        }
    }
}

const fn default_mapping() -> bool {
    true
}
