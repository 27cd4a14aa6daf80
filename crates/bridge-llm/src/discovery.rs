//! Lazily discovered backend model set
//!
//! The set is fetched once, with the credential of the first request that
//! needs it. Concurrent first callers wait on the same fetch. A failed fetch
//! installs [`DEFAULT_MODELS`] so routing keeps working in degraded form.

use std::sync::Arc;

use secrecy::SecretString;
use tokio::sync::{OnceCell, RwLock};

use crate::error::LlmError;
use crate::protocol::google::GoogleModelInfo;
use crate::provider::Backend;
use crate::routing::{DEFAULT_MODELS, strip_models_prefix};

pub struct ModelCatalog {
    backend: Arc<dyn Backend>,
    loaded: OnceCell<()>,
    models: RwLock<Arc<Vec<String>>>,
}

impl ModelCatalog {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            loaded: OnceCell::new(),
            models: RwLock::new(Arc::new(default_models())),
        }
    }

    /// Current model set; the default set until the first fetch completes
    pub async fn snapshot(&self) -> Arc<Vec<String>> {
        Arc::clone(&*self.models.read().await)
    }

    /// Fetch the model list if no fetch has happened yet, then return the set
    pub async fn ensure_loaded(&self, credential: &SecretString) -> Arc<Vec<String>> {
        self.loaded
            .get_or_init(|| async {
                let models = match self.fetch(credential).await {
                    Ok(models) => {
                        tracing::info!(count = models.len(), "discovered backend models");
                        models
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to fetch backend models, using defaults");
                        default_models()
                    }
                };

                *self.models.write().await = Arc::new(models);
            })
            .await;

        self.snapshot().await
    }

    /// Re-fetch the model list, replacing the set only on success
    pub async fn refresh(&self, credential: &SecretString) -> Result<usize, LlmError> {
        let models = self.fetch(credential).await?;
        let count = models.len();

        *self.models.write().await = Arc::new(models);
        // a successful refresh counts as the initial load
        let _ = self.loaded.set(());

        Ok(count)
    }

    async fn fetch(&self, credential: &SecretString) -> Result<Vec<String>, LlmError> {
        let models = model_names(self.backend.list_models(credential).await?);

        if models.is_empty() {
            return Err(LlmError::Transport("backend returned an empty model list".to_owned()));
        }

        Ok(models)
    }
}

fn default_models() -> Vec<String> {
    DEFAULT_MODELS.iter().map(|m| (*m).to_owned()).collect()
}

/// Names usable for generation or embedding, without the `models/` prefix
fn model_names(models: Vec<GoogleModelInfo>) -> Vec<String> {
    models
        .into_iter()
        .filter(|m| {
            m.supported_generation_methods.is_empty()
                || m.supported_generation_methods.iter().any(|method| {
                    matches!(
                        method.as_str(),
                        "generateContent" | "streamGenerateContent" | "embedContent" | "batchEmbedContents"
                    )
                })
        })
        .map(|m| strip_models_prefix(&m.name).to_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::convert::request::GenerateCall;
    use crate::protocol::google::{GoogleBatchEmbedRequest, GoogleBatchEmbedResponse, GoogleResponse};
    use crate::provider::BackendStream;

    struct ListingBackend {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Backend for ListingBackend {
        async fn generate(&self, _: &GenerateCall, _: &SecretString) -> Result<GoogleResponse, LlmError> {
            unimplemented!()
        }

        async fn stream_generate(&self, _: &GenerateCall, _: &SecretString) -> Result<BackendStream, LlmError> {
            unimplemented!()
        }

        async fn batch_embed(
            &self,
            _: &str,
            _: &GoogleBatchEmbedRequest,
            _: &SecretString,
        ) -> Result<GoogleBatchEmbedResponse, LlmError> {
            unimplemented!()
        }

        async fn list_models(&self, _: &SecretString) -> Result<Vec<GoogleModelInfo>, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;

            if self.fail {
                return Err(LlmError::Transport("connection refused".to_owned()));
            }

            Ok(vec![
                GoogleModelInfo {
                    name: "models/gemini-exp-1206".to_owned(),
                    display_name: None,
                    supported_generation_methods: vec!["generateContent".to_owned()],
                },
                GoogleModelInfo {
                    name: "models/aqa".to_owned(),
                    display_name: None,
                    supported_generation_methods: vec!["generateAnswer".to_owned()],
                },
            ])
        }
    }

    fn catalog(fail: bool) -> (Arc<ListingBackend>, ModelCatalog) {
        let backend = Arc::new(ListingBackend {
            calls: AtomicUsize::new(0),
            fail,
        });
        let catalog = ModelCatalog::new(Arc::clone(&backend) as Arc<dyn Backend>);
        (backend, catalog)
    }

    fn key() -> SecretString {
        SecretString::from("test-key")
    }

    #[tokio::test]
    async fn defaults_before_first_fetch() {
        let (backend, catalog) = catalog(false);

        assert_eq!(catalog.snapshot().await.len(), DEFAULT_MODELS.len());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_first_callers_fetch_once() {
        let (backend, catalog) = catalog(false);
        let key = key();

        let (a, b, c) = tokio::join!(
            catalog.ensure_loaded(&key),
            catalog.ensure_loaded(&key),
            catalog.ensure_loaded(&key)
        );

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*a, vec!["gemini-exp-1206".to_owned()]);
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[tokio::test]
    async fn failed_fetch_installs_defaults_and_is_not_retried() {
        let (backend, catalog) = catalog(true);

        let models = catalog.ensure_loaded(&key()).await;
        assert_eq!(models.len(), DEFAULT_MODELS.len());

        catalog.ensure_loaded(&key()).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_keeps_previous_set_on_failure() {
        let (_, catalog) = catalog(true);

        assert!(catalog.refresh(&key()).await.is_err());
        assert_eq!(catalog.snapshot().await.len(), DEFAULT_MODELS.len());
    }

    #[tokio::test]
    async fn refresh_replaces_set() {
        let (backend, catalog) = catalog(false);

        assert_eq!(catalog.refresh(&key()).await.unwrap(), 1);
        catalog.ensure_loaded(&key()).await;

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*catalog.snapshot().await, vec!["gemini-exp-1206".to_owned()]);
    }
}
