use std::time::Duration;

use serde::Deserialize;

/// Cross-origin policy for browser clients
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorsConfig {
    /// `"*"` or a list of origins
    #[serde(default)]
    pub origins: AnyOrList,
    /// `"*"` or a list of methods; GET and POST when omitted
    #[serde(default = "default_methods")]
    pub methods: AnyOrList,
    /// `"*"` or a list of request headers
    #[serde(default)]
    pub headers: AnyOrList,
    /// Response headers readable by the browser
    #[serde(default)]
    pub expose_headers: Vec<String>,
    /// Allow cookies and authorization headers on cross-origin requests
    #[serde(default)]
    pub credentials: bool,
    /// Preflight cache lifetime in seconds
    #[serde(default)]
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origins: AnyOrList::Any,
            methods: default_methods(),
            headers: AnyOrList::Any,
            expose_headers: Vec::new(),
            credentials: false,
            max_age: None,
        }
    }
}

impl CorsConfig {
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age.map(Duration::from_secs)
    }
}

fn default_methods() -> AnyOrList {
    AnyOrList::List(vec!["GET".to_owned(), "POST".to_owned()])
}

/// Wildcard or explicit allow-list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AnyOrList {
    #[default]
    Any,
    List(Vec<String>),
}

impl<'de> Deserialize<'de> for AnyOrList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<String>),
        }

        let values = match Raw::deserialize(deserializer)? {
            Raw::One(value) => vec![value],
            Raw::Many(values) => values,
        };

        if values.iter().any(|v| v == "*") {
            Ok(Self::Any)
        } else {
            Ok(Self::List(values))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_anywhere_means_any() {
        let config: CorsConfig = toml::from_str(r#"origins = ["https://a.example", "*"]"#).unwrap();
        assert_eq!(config.origins, AnyOrList::Any);
    }

    #[test]
    fn single_string_becomes_list() {
        let config: CorsConfig = toml::from_str(r#"origins = "https://a.example""#).unwrap();
        assert_eq!(config.origins, AnyOrList::List(vec!["https://a.example".to_owned()]));
        assert_eq!(config.methods, default_methods());
    }
}
