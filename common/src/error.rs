use async_openai::error::OpenAIError;
use thiserror::Error;

/// Errors shared by ingestion, retrieval and both routers. The routers
/// decide how much of each one a caller gets to see.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Vector store was built with '{stored}', but '{current}' is configured")]
    EmbeddingMismatch { stored: String, current: String },

    #[error("Corpus processing error: {0}")]
    Processing(String),
    #[error("Answer generation failed: {0}")]
    Generation(String),
    #[error("Internal service error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Readability extraction failed: {0}")]
    Extraction(#[from] dom_smoothie::ReadabilityError),
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
