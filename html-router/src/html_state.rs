use std::sync::Arc;

use axum_session::{SessionConfig, SessionStore};
use common::{
    create_template_engine,
    error::AppError,
    utils::{
        config::AppConfig,
        template_engine::{ProvidesTemplateEngine, TemplateEngine},
    },
};
use retrieval_pipeline::LegalQaChain;
use tracing::debug;

use crate::SessionStoreType;

#[derive(Clone)]
pub struct HtmlState {
    pub qa_chain: Arc<LegalQaChain>,
    pub templates: Arc<TemplateEngine>,
    pub session_store: Arc<SessionStoreType>,
    pub config: AppConfig,
}

impl HtmlState {
    pub async fn new_with_resources(
        qa_chain: Arc<LegalQaChain>,
        config: AppConfig,
        template_engine: Option<Arc<TemplateEngine>>,
    ) -> Result<Self, AppError> {
        let templates =
            template_engine.unwrap_or_else(|| Arc::new(create_template_engine!("templates")));
        debug!("Template engine configured for html_router.");

        let session_store = SessionStore::new(None, SessionConfig::default())
            .await
            .map_err(|e| AppError::Internal(format!("session store: {e}")))?;

        Ok(Self {
            qa_chain,
            templates,
            session_store: Arc::new(session_store),
            config,
        })
    }
}

impl ProvidesTemplateEngine for HtmlState {
    fn template_engine(&self) -> &Arc<TemplateEngine> {
        &self.templates
    }
}
