use std::sync::Arc;

use common::{
    storage::db::SurrealDbClient,
    utils::{config::AppConfig, embedding::EmbeddingProvider},
};
use ingestion_pipeline::IngestionPipeline;
use retrieval_pipeline::LegalQaChain;

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub embedding_provider: Arc<EmbeddingProvider>,
    pub qa_chain: Arc<LegalQaChain>,
    pub ingestion_pipeline: Arc<IngestionPipeline>,
}

impl ApiState {
    pub fn new(
        db: Arc<SurrealDbClient>,
        config: &AppConfig,
        embedding_provider: Arc<EmbeddingProvider>,
        qa_chain: Arc<LegalQaChain>,
        ingestion_pipeline: Arc<IngestionPipeline>,
    ) -> Self {
        Self {
            db,
            config: config.clone(),
            embedding_provider,
            qa_chain,
            ingestion_pipeline,
        }
    }
}
