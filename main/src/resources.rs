use std::sync::Arc;

use async_openai::{config::OpenAIConfig, Client};
use common::{
    error::AppError,
    storage::db::SurrealDbClient,
    utils::{config::AppConfig, embedding::EmbeddingProvider},
};
use ingestion_pipeline::IngestionPipeline;
use retrieval_pipeline::{llm::language_model_from_config, LegalQaChain};
use tracing::info;

/// Long-lived handles shared by the CLI commands and the web server.
#[derive(Clone)]
pub struct Resources {
    pub config: AppConfig,
    pub db: Arc<SurrealDbClient>,
    pub embedding_provider: Arc<EmbeddingProvider>,
    pub qa_chain: Arc<LegalQaChain>,
    pub ingestion_pipeline: Arc<IngestionPipeline>,
}

impl Resources {
    pub async fn from_config(config: AppConfig) -> Result<Self, AppError> {
        let db = Arc::new(SurrealDbClient::from_config(&config).await?);
        let openai_client = openai_client(&config);

        let embedding_provider =
            Arc::new(EmbeddingProvider::from_config(&config, openai_client.clone()).await?);
        info!(
            embedding_backend = embedding_provider.backend_label(),
            embedding_dimension = embedding_provider.dimension(),
            "Embedding provider initialized"
        );

        Self::with_provider(config, db, embedding_provider, openai_client)
    }

    pub fn with_provider(
        config: AppConfig,
        db: Arc<SurrealDbClient>,
        embedding_provider: Arc<EmbeddingProvider>,
        openai_client: Option<Arc<Client<OpenAIConfig>>>,
    ) -> Result<Self, AppError> {
        let model = language_model_from_config(&config, openai_client)?;
        info!(model = %model.label(), "Language model selected");

        let qa_chain = Arc::new(LegalQaChain::new(
            Arc::clone(&db),
            Arc::clone(&embedding_provider),
            model,
            &config,
        ));
        let ingestion_pipeline = Arc::new(IngestionPipeline::new(
            Arc::clone(&db),
            &config,
            Arc::clone(&embedding_provider),
        )?);

        Ok(Self {
            config,
            db,
            embedding_provider,
            qa_chain,
            ingestion_pipeline,
        })
    }
}

/// Only built when a key is configured; the local backends never need one.
fn openai_client(config: &AppConfig) -> Option<Arc<Client<OpenAIConfig>>> {
    let api_key = config
        .openai_api_key
        .as_deref()
        .filter(|key| !key.is_empty())?;
    Some(Arc::new(Client::with_config(
        OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(&config.openai_base_url),
    )))
}
