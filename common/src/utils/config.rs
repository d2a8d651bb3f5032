use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::{error::AppError, utils::embedding::EmbeddingBackend};

/// Which language model writes the final answer.
#[derive(Clone, Copy, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// Deterministic, local: quotes the retrieved article text.
    #[default]
    Extractive,
    /// Any OpenAI compatible chat completion endpoint.
    OpenAI,
}

impl LlmBackend {
    pub fn label(self) -> &'static str {
        match self {
            Self::Extractive => "extractive",
            Self::OpenAI => "openai",
        }
    }
}

/// Largest number of chunks a single question may retrieve.
pub const MAX_TOP_K: usize = 50;

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_corpus_extension")]
    pub corpus_extension: String,
    #[serde(default = "default_vector_store_dir")]
    pub vector_store_dir: String,
    /// Overrides `vector_store_dir`, e.g. `mem://` or `ws://localhost:8000`.
    #[serde(default)]
    pub surrealdb_address: Option<String>,
    #[serde(default)]
    pub surrealdb_username: Option<String>,
    #[serde(default)]
    pub surrealdb_password: Option<String>,
    #[serde(default = "default_namespace")]
    pub surrealdb_namespace: String,
    #[serde(default = "default_database")]
    pub surrealdb_database: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default)]
    pub embedding_backend: EmbeddingBackend,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: u32,
    #[serde(default = "default_true")]
    pub embedding_fallback: bool,
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,
    #[serde(default)]
    pub llm_backend: LlmBackend,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_query_model")]
    pub query_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_law_title")]
    pub law_title: String,
    #[serde(default = "default_chunk_min_chars")]
    pub chunk_min_chars: usize,
    #[serde(default = "default_chunk_max_chars")]
    pub chunk_max_chars: usize,
    #[serde(default = "default_chunk_overlap_chars")]
    pub chunk_overlap_chars: usize,
    /// When set, `/api/v1/ingest` requires this key.
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_corpus_extension() -> String {
    "txt".to_string()
}

fn default_vector_store_dir() -> String {
    "./vector_store".to_string()
}

fn default_namespace() -> String {
    "legal_rag".to_string()
}

fn default_database() -> String {
    "legal_documents".to_string()
}

fn default_http_port() -> u16 {
    3000
}

fn default_embedding_dimensions() -> u32 {
    384
}

fn default_true() -> bool {
    true
}

fn default_embed_batch_size() -> usize {
    32
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_query_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_top_k() -> usize {
    4
}

fn default_law_title() -> String {
    "中华人民共和国劳动法".to_string()
}

fn default_chunk_min_chars() -> usize {
    500
}

fn default_chunk_max_chars() -> usize {
    1000
}

fn default_chunk_overlap_chars() -> usize {
    200
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            corpus_extension: default_corpus_extension(),
            vector_store_dir: default_vector_store_dir(),
            surrealdb_address: None,
            surrealdb_username: None,
            surrealdb_password: None,
            surrealdb_namespace: default_namespace(),
            surrealdb_database: default_database(),
            http_port: default_http_port(),
            embedding_backend: EmbeddingBackend::default(),
            embedding_model: None,
            embedding_dimensions: default_embedding_dimensions(),
            embedding_fallback: true,
            embed_batch_size: default_embed_batch_size(),
            llm_backend: LlmBackend::default(),
            openai_api_key: None,
            openai_base_url: default_base_url(),
            query_model: default_query_model(),
            temperature: default_temperature(),
            top_k: default_top_k(),
            law_title: default_law_title(),
            chunk_min_chars: default_chunk_min_chars(),
            chunk_max_chars: default_chunk_max_chars(),
            chunk_overlap_chars: default_chunk_overlap_chars(),
            api_key: None,
        }
    }
}

impl AppConfig {
    /// Rejects combinations that would only fail later, mid-request.
    pub fn validate(&self) -> Result<(), AppError> {
        validate_top_k(self.top_k)?;
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(AppError::Validation(format!(
                "temperature must be within 0.0..=1.0, got {}",
                self.temperature
            )));
        }
        if self.chunk_min_chars == 0 || self.chunk_min_chars > self.chunk_max_chars {
            return Err(AppError::Validation(format!(
                "chunk bounds are invalid: min {} max {}",
                self.chunk_min_chars, self.chunk_max_chars
            )));
        }
        if self.chunk_overlap_chars >= self.chunk_min_chars {
            return Err(AppError::Validation(
                "chunk_overlap_chars must be smaller than chunk_min_chars".into(),
            ));
        }
        if self.embed_batch_size == 0 {
            return Err(AppError::Validation(
                "embed_batch_size must be at least 1".into(),
            ));
        }
        let needs_key = self.llm_backend == LlmBackend::OpenAI
            || self.embedding_backend == EmbeddingBackend::OpenAI;
        if needs_key && self.openai_api_key.as_deref().is_none_or(str::is_empty) {
            return Err(AppError::Validation(
                "openai_api_key is required for the openai backends".into(),
            ));
        }
        Ok(())
    }

    /// Address handed to SurrealDB: explicit override, else the on-disk store.
    pub fn database_address(&self) -> String {
        self.surrealdb_address
            .clone()
            .unwrap_or_else(|| format!("surrealkv://{}", self.vector_store_dir))
    }
}

pub fn validate_top_k(top_k: usize) -> Result<(), AppError> {
    if (1..=MAX_TOP_K).contains(&top_k) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "top_k must be within 1..={MAX_TOP_K}, got {top_k}"
        )))
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
