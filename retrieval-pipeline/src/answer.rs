use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::index_manifest::IndexManifest},
    utils::{
        config::{validate_top_k, AppConfig},
        embedding::EmbeddingProvider,
    },
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::{
    llm::{GenerationRequest, LanguageModel},
    prompt::{build_prompt, display_article, display_content, format_context, REFUSAL},
    retrieve_chunks, RetrievedChunk,
};

/// Per-question overrides; unset fields fall back to the configured defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct AskOptions {
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "default_show_sources")]
    pub show_sources: bool,
    #[serde(default)]
    pub top_k: Option<usize>,
}

fn default_show_sources() -> bool {
    true
}

impl Default for AskOptions {
    fn default() -> Self {
        Self {
            temperature: None,
            show_sources: true,
            top_k: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceReference {
    pub article: String,
    pub content: String,
    pub source: String,
    pub chapter: Option<String>,
    pub score: f32,
}

impl From<&RetrievedChunk> for SourceReference {
    fn from(retrieved: &RetrievedChunk) -> Self {
        Self {
            article: display_article(retrieved),
            content: display_content(retrieved),
            source: retrieved.chunk.source.clone(),
            chapter: retrieved.chunk.chapter.clone(),
            score: retrieved.score,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub question: String,
    pub answer: String,
    pub model: String,
    /// Empty unless sources were requested.
    pub sources: Vec<SourceReference>,
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Question -> embed -> retrieve -> prompt -> model -> answer.
#[derive(Clone)]
pub struct LegalQaChain {
    db: Arc<SurrealDbClient>,
    embedder: Arc<EmbeddingProvider>,
    model: Arc<dyn LanguageModel>,
    top_k: usize,
    temperature: f32,
}

impl LegalQaChain {
    pub fn new(
        db: Arc<SurrealDbClient>,
        embedder: Arc<EmbeddingProvider>,
        model: Arc<dyn LanguageModel>,
        config: &AppConfig,
    ) -> Self {
        Self {
            db,
            embedder,
            model,
            top_k: config.top_k,
            temperature: config.temperature,
        }
    }

    pub fn model_label(&self) -> String {
        self.model.label()
    }

    pub fn default_temperature(&self) -> f32 {
        self.temperature
    }

    /// Answers one question. Retrieval runs exactly once; the same chunks
    /// feed the prompt and the returned sources.
    #[instrument(skip_all, fields(model = %self.model.label()))]
    pub async fn ask(&self, question: &str, options: AskOptions) -> Result<Answer, AppError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::Validation("question must not be empty".into()));
        }

        let temperature = options.temperature.unwrap_or(self.temperature);
        if !(0.0..=1.0).contains(&temperature) {
            return Err(AppError::Validation(format!(
                "temperature must be within 0.0..=1.0, got {temperature}"
            )));
        }
        let top_k = options.top_k.unwrap_or(self.top_k);
        validate_top_k(top_k)?;

        IndexManifest::require_compatible(&self.db, &self.embedder).await?;

        let started = Instant::now();
        let chunks = retrieve_chunks(&self.db, &self.embedder, question, top_k).await?;
        let retrieval_ms = duration_millis(started.elapsed());

        let answer = if chunks.is_empty() {
            REFUSAL.to_string()
        } else {
            let context = format_context(&chunks);
            let prompt = build_prompt(&context, question);
            self.model
                .generate(GenerationRequest {
                    question,
                    context: &context,
                    prompt: &prompt,
                    chunks: &chunks,
                    temperature,
                })
                .await?
        };
        let total_ms = duration_millis(started.elapsed());

        info!(
            retrieved = chunks.len(),
            top_k,
            temperature,
            retrieval_ms,
            total_ms,
            "Answered legal question"
        );

        let sources = if options.show_sources {
            chunks.iter().map(SourceReference::from).collect()
        } else {
            Vec::new()
        };

        Ok(Answer {
            question: question.to_string(),
            answer,
            model: self.model.label(),
            sources,
        })
    }
}
