//! Model name resolution between outward aliases and backend models
//!
//! Resolution is a pure function of the requested name, the mapping flag and
//! a snapshot of the discovered model set. The snapshot itself is owned by
//! [`crate::discovery::ModelCatalog`].

use bridge_config::ModelsConfig;

pub const GEMINI_PRO: &str = "gemini-1.5-pro-latest";
pub const GEMINI_FLASH: &str = "gemini-1.5-flash-002";
pub const GEMINI_PRO_VISION: &str = "gemini-1.0-pro-vision-latest";
pub const GEMINI_FLASH_2: &str = "gemini-2.0-flash-exp";
pub const TEXT_EMBEDDING: &str = "text-embedding-004";

/// Backend models assumed to exist when the model list cannot be fetched
pub const DEFAULT_MODELS: [&str; 5] = [GEMINI_PRO, GEMINI_FLASH, GEMINI_PRO_VISION, GEMINI_FLASH_2, TEXT_EMBEDDING];

pub const GPT_3_5_TURBO: &str = "gpt-3.5-turbo";
pub const GPT_4: &str = "gpt-4";
pub const GPT_4_TURBO_PREVIEW: &str = "gpt-4-turbo-preview";
pub const GPT_4_VISION_PREVIEW: &str = "gpt-4-vision-preview";
pub const GPT_4O: &str = "gpt-4o";
pub const TEXT_EMBEDDING_ADA_002: &str = "text-embedding-ada-002";

/// Outward aliases listed when mapping is enabled
const OUTWARD_MODELS: [&str; 6] = [
    GPT_3_5_TURBO,
    GPT_4,
    GPT_4_TURBO_PREVIEW,
    GPT_4_VISION_PREVIEW,
    GPT_4O,
    TEXT_EMBEDDING_ADA_002,
];

/// How an alias rule matches a requested name
enum Pattern {
    Exact(&'static [&'static str]),
    Prefix(&'static str),
}

impl Pattern {
    fn matches(&self, requested: &str) -> bool {
        match self {
            Self::Exact(names) => names.contains(&requested),
            Self::Prefix(prefix) => requested.starts_with(prefix),
        }
    }
}

/// Alias table, first match wins
///
/// The `gpt-4` prefix rule shadows the later `gpt-4o` rule, so `gpt-4o`
/// resolves to flash. Reordering changes which model clients get.
const ALIAS_RULES: [(Pattern, &str); 5] = [
    (Pattern::Exact(&[GPT_4_VISION_PREVIEW]), GEMINI_PRO_VISION),
    (
        Pattern::Exact(&[GPT_4_TURBO_PREVIEW, "gpt-4-1106-preview", "gpt-4-0125-preview"]),
        GEMINI_PRO,
    ),
    (Pattern::Prefix(GPT_4), GEMINI_FLASH),
    (Pattern::Exact(&[TEXT_EMBEDDING_ADA_002]), TEXT_EMBEDDING),
    (Pattern::Exact(&[GPT_4O]), GEMINI_FLASH_2),
];

/// Outward to backend model name mapping
#[derive(Debug, Clone)]
pub struct ModelRouter {
    mapping: bool,
    vision_override: Option<String>,
}

impl ModelRouter {
    pub fn new(config: &ModelsConfig) -> Self {
        Self {
            mapping: config.mapping,
            vision_override: config.vision_model.clone(),
        }
    }

    /// Backend model for a chat completion request
    pub fn resolve_chat(&self, requested: &str, known: &[String]) -> String {
        let requested = strip_models_prefix(requested);

        if self.mapping {
            if requested == GPT_4_VISION_PREVIEW {
                return self.vision_model();
            }
            return apply_alias_rules(requested).to_owned();
        }

        if requested == GEMINI_PRO_VISION {
            return self.vision_model();
        }

        if known.iter().any(|m| m == requested) {
            return requested.to_owned();
        }

        tracing::warn!(model = %requested, fallback = GEMINI_FLASH, "unknown model, using default");
        GEMINI_FLASH.to_owned()
    }

    /// Backend model for an embeddings request
    pub fn resolve_embedding(&self, requested: &str, known: &[String]) -> String {
        let requested = strip_models_prefix(requested);

        if self.mapping {
            return apply_alias_rules(requested).to_owned();
        }

        if known.iter().any(|m| m == requested) {
            return requested.to_owned();
        }

        tracing::warn!(model = %requested, fallback = TEXT_EMBEDDING, "unknown embedding model, using default");
        TEXT_EMBEDDING.to_owned()
    }

    /// Outward name reported in responses for a backend model
    pub fn unresolve(&self, backend: &str) -> String {
        if !self.mapping {
            return backend.to_owned();
        }

        match backend {
            GEMINI_PRO => GPT_4_TURBO_PREVIEW,
            GEMINI_FLASH => GPT_4,
            GEMINI_FLASH_2 => GPT_4O,
            TEXT_EMBEDDING => TEXT_EMBEDDING_ADA_002,
            _ => GPT_3_5_TURBO,
        }
        .to_owned()
    }

    /// Model ids exposed by the listing endpoint
    pub fn listing(&self, known: &[String]) -> Vec<String> {
        if self.mapping {
            OUTWARD_MODELS.iter().map(|m| (*m).to_owned()).collect()
        } else {
            known.to_vec()
        }
    }

    /// `owned_by` value for listed models
    pub const fn owner(&self) -> &'static str {
        if self.mapping { "openai" } else { "google" }
    }

    fn vision_model(&self) -> String {
        self.vision_override.clone().unwrap_or_else(|| GEMINI_FLASH.to_owned())
    }
}

fn apply_alias_rules(requested: &str) -> &'static str {
    ALIAS_RULES
        .iter()
        .find(|(pattern, _)| pattern.matches(requested))
        .map_or(GEMINI_FLASH, |(_, target)| *target)
}

/// Whether a backend model only serves embeddings
pub fn is_embedding_model(backend: &str) -> bool {
    backend.contains("embedding")
}

pub fn strip_models_prefix(name: &str) -> &str {
    name.strip_prefix("models/").unwrap_or(name)
}
