use std::sync::Arc;

use async_trait::async_trait;
use common::{
    error::AppError,
    utils::embedding::{EmbeddingFingerprint, EmbeddingProvider, HASHED_MODEL_NAME},
};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};
use tracing::warn;

/// The embedding side of ingestion. Split out so the pipeline can be driven
/// without a real model.
#[async_trait]
pub trait PipelineServices: Send + Sync {
    fn backend(&self) -> String;

    fn model(&self) -> String;

    fn dimension(&self) -> usize;

    fn fingerprint(&self) -> EmbeddingFingerprint {
        EmbeddingFingerprint::new(&self.backend(), &self.model(), self.dimension())
    }

    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, AppError>;
}

pub struct DefaultPipelineServices {
    embedding_provider: Arc<EmbeddingProvider>,
    attempts: usize,
    initial_backoff_ms: u64,
}

impl DefaultPipelineServices {
    pub fn new(
        embedding_provider: Arc<EmbeddingProvider>,
        attempts: usize,
        initial_backoff_ms: u64,
    ) -> Self {
        Self {
            embedding_provider,
            attempts,
            initial_backoff_ms,
        }
    }
}

#[async_trait]
impl PipelineServices for DefaultPipelineServices {
    fn backend(&self) -> String {
        self.embedding_provider.backend_label().to_string()
    }

    fn model(&self) -> String {
        self.embedding_provider
            .model_code()
            .unwrap_or_else(|| HASHED_MODEL_NAME.to_string())
    }

    fn dimension(&self) -> usize {
        self.embedding_provider.dimension()
    }

    fn fingerprint(&self) -> EmbeddingFingerprint {
        self.embedding_provider.fingerprint()
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let retry_strategy = ExponentialBackoff::from_millis(self.initial_backoff_ms)
            .map(jitter)
            .take(self.attempts.saturating_sub(1));

        let provider = &self.embedding_provider;
        Retry::spawn(retry_strategy, || {
            let batch = texts.clone();
            async move {
                provider.embed_batch(batch).await.map_err(|err| {
                    warn!(error = %err, "embedding batch failed");
                    err
                })
            }
        })
        .await
        .map_err(AppError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_services_mirror_the_provider() {
        let provider = Arc::new(EmbeddingProvider::new_hashed(24));
        let services = DefaultPipelineServices::new(Arc::clone(&provider), 3, 1);

        assert_eq!(services.backend(), "hashed");
        assert_eq!(services.model(), HASHED_MODEL_NAME);
        assert_eq!(services.dimension(), 24);
        assert_eq!(services.fingerprint(), provider.fingerprint());

        let vectors = services
            .embed_batch(vec!["工资".into(), "工作时间".into()])
            .await
            .expect("embed");
        assert_eq!(vectors.len(), 2);
        assert!(vectors.iter().all(|v| v.len() == 24));
        assert!(services.embed_batch(Vec::new()).await.expect("empty").is_empty());
    }
}
