use std::path::PathBuf;

use common::utils::config::AppConfig;

use crate::splitter::ChunkBounds;

#[derive(Debug, Clone)]
pub struct IngestionTuning {
    pub chunk_min_chars: usize,
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
    pub embed_batch_size: usize,
    pub embed_attempts: usize,
    pub embed_initial_backoff_ms: u64,
}

impl Default for IngestionTuning {
    fn default() -> Self {
        Self {
            chunk_min_chars: 500,
            chunk_max_chars: 1_000,
            chunk_overlap_chars: 200,
            embed_batch_size: 32,
            embed_attempts: 3,
            embed_initial_backoff_ms: 100,
        }
    }
}

impl IngestionTuning {
    pub fn chunk_bounds(&self) -> ChunkBounds {
        ChunkBounds {
            min_chars: self.chunk_min_chars,
            max_chars: self.chunk_max_chars,
            overlap_chars: self.chunk_overlap_chars,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionConfig {
    pub tuning: IngestionTuning,
    /// Directory scanned for statute files.
    pub corpus_dir: PathBuf,
    pub corpus_extension: String,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            tuning: IngestionTuning::default(),
            corpus_dir: PathBuf::from("./data"),
            corpus_extension: "txt".to_string(),
        }
    }
}

impl IngestionConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        let defaults = IngestionTuning::default();
        Self {
            tuning: IngestionTuning {
                chunk_min_chars: config.chunk_min_chars,
                chunk_max_chars: config.chunk_max_chars,
                chunk_overlap_chars: config.chunk_overlap_chars,
                embed_batch_size: config.embed_batch_size,
                ..defaults
            },
            corpus_dir: PathBuf::from(&config.data_dir),
            corpus_extension: config.corpus_extension.clone(),
        }
    }
}
