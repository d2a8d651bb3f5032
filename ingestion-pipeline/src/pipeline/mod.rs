mod config;
mod report;
mod services;

pub use config::{IngestionConfig, IngestionTuning};
pub use report::IngestionReport;
#[allow(clippy::module_name_repetitions)]
pub use services::{DefaultPipelineServices, PipelineServices};

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        indexes::ensure_chunk_indexes,
        types::{
            index_manifest::IndexManifest,
            legal_document::{document_id_for, LegalDocument},
            text_chunk::{ChunkDraft, TextChunk},
            StoredObject,
        },
    },
    utils::{
        config::AppConfig,
        embedding::{EmbeddingFingerprint, EmbeddingProvider},
    },
};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::{
    corpus::{scan_corpus, CorpusDocument},
    splitter::StatuteSplitter,
};

/// Turns the corpus directory into chunk records with embeddings.
#[allow(clippy::module_name_repetitions)]
pub struct IngestionPipeline {
    db: Arc<SurrealDbClient>,
    pipeline_config: IngestionConfig,
    services: Arc<dyn PipelineServices>,
    run_lock: Mutex<()>,
}

impl IngestionPipeline {
    pub fn new(
        db: Arc<SurrealDbClient>,
        config: &AppConfig,
        embedding_provider: Arc<EmbeddingProvider>,
    ) -> Result<Self, AppError> {
        Self::new_with_config(
            db,
            embedding_provider,
            IngestionConfig::from_app_config(config),
        )
    }

    pub fn new_with_config(
        db: Arc<SurrealDbClient>,
        embedding_provider: Arc<EmbeddingProvider>,
        pipeline_config: IngestionConfig,
    ) -> Result<Self, AppError> {
        let services = DefaultPipelineServices::new(
            embedding_provider,
            pipeline_config.tuning.embed_attempts,
            pipeline_config.tuning.embed_initial_backoff_ms,
        );

        Self::with_services(db, pipeline_config, Arc::new(services))
    }

    pub fn with_services(
        db: Arc<SurrealDbClient>,
        pipeline_config: IngestionConfig,
        services: Arc<dyn PipelineServices>,
    ) -> Result<Self, AppError> {
        if pipeline_config.tuning.embed_batch_size == 0 {
            return Err(AppError::Validation(
                "embed_batch_size must be at least 1".into(),
            ));
        }
        // Fail on bad bounds at construction instead of mid-run.
        StatuteSplitter::new(pipeline_config.tuning.chunk_bounds())?;

        Ok(Self {
            db,
            pipeline_config,
            services,
            run_lock: Mutex::new(()),
        })
    }

    fn duration_millis(duration: Duration) -> u64 {
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
    }

    /// True when the store has no manifest, one written by another model,
    /// or no chunks at all.
    pub async fn needs_rebuild(&self) -> Result<bool, AppError> {
        let fingerprint = self.services.fingerprint();
        let compatible = IndexManifest::get_current(&self.db)
            .await?
            .is_some_and(|manifest| manifest.fingerprint == fingerprint.as_str());
        if !compatible {
            return Ok(true);
        }
        Ok(TextChunk::count(&self.db).await? == 0)
    }

    /// Brings the store in line with the corpus directory.
    ///
    /// Unchanged documents are skipped, changed ones are re-embedded and
    /// removed files are pruned. `force`, or a different embedding model than
    /// the one recorded in the manifest, wipes the store first.
    #[instrument(skip_all, fields(force = force))]
    pub async fn run(&self, force: bool) -> Result<IngestionReport, AppError> {
        let _guard = self.run_lock.lock().await;
        let pipeline_started = Instant::now();

        let fingerprint = self.services.fingerprint();
        let dimension = self.services.dimension();
        let manifest = IndexManifest::get_current(&self.db).await?;
        let model_changed = manifest
            .as_ref()
            .is_some_and(|m| m.fingerprint != fingerprint.as_str());
        if model_changed {
            warn!(
                stored = manifest.as_ref().map(|m| m.fingerprint.as_str()),
                current = %fingerprint,
                "embedding model changed; rebuilding vector store"
            );
        }

        let mut report = IngestionReport {
            rebuilt: force || model_changed,
            ..IngestionReport::default()
        };

        let stage_start = Instant::now();
        if report.rebuilt {
            self.reset_store().await?;
        }
        ensure_chunk_indexes(&self.db, dimension, report.rebuilt).await?;
        let prepare_ms = Self::duration_millis(stage_start.elapsed());

        let stage_start = Instant::now();
        let documents = scan_corpus(
            &self.pipeline_config.corpus_dir,
            &self.pipeline_config.corpus_extension,
        )
        .await?;
        report.documents_seen = documents.len();
        if documents.is_empty() {
            warn!(
                corpus_dir = %self.pipeline_config.corpus_dir.display(),
                "corpus directory holds no documents"
            );
        }
        let scan_ms = Self::duration_millis(stage_start.elapsed());

        let stage_start = Instant::now();
        let splitter = StatuteSplitter::new(self.pipeline_config.tuning.chunk_bounds())?;
        let existing: HashMap<String, LegalDocument> = LegalDocument::get_all(&self.db)
            .await?
            .into_iter()
            .map(|doc| (doc.id.clone(), doc))
            .collect();

        let mut seen_ids: HashMap<String, &str> = HashMap::new();
        for document in &documents {
            let document_id = document_id_for(&document.source);
            if let Some(previous) = seen_ids.insert(document_id.clone(), &document.source) {
                return Err(AppError::Validation(format!(
                    "corpus files {previous} and {} map to the same document id {document_id}",
                    document.source
                )));
            }

            let up_to_date = existing
                .get(&document_id)
                .is_some_and(|stored| stored.is_current(&document.sha256, fingerprint.as_str()));
            if up_to_date {
                debug!(source = %document.source, "document unchanged; skipping");
                report.documents_skipped += 1;
                continue;
            }

            let written = self
                .index_document(document, &document_id, &splitter, &fingerprint)
                .await?;
            report.documents_indexed += 1;
            report.chunks_written += written;
        }
        let embed_ms = Self::duration_millis(stage_start.elapsed());

        for stale_id in existing.keys().filter(|id| !seen_ids.contains_key(*id)) {
            info!(document_id = %stale_id, "pruning document no longer in corpus");
            LegalDocument::delete_with_chunks(stale_id, &self.db).await?;
            report.documents_removed += 1;
        }

        report.total_chunks = TextChunk::count(&self.db).await?;
        let document_count = LegalDocument::get_all(&self.db).await?.len();
        IndexManifest::new(
            &self.services.backend(),
            &self.services.model(),
            dimension,
            document_count,
            report.total_chunks,
        )
        .save(&self.db)
        .await?;

        info!(
            total_ms = Self::duration_millis(pipeline_started.elapsed()),
            prepare_ms,
            scan_ms,
            embed_ms,
            documents_seen = report.documents_seen,
            documents_indexed = report.documents_indexed,
            documents_skipped = report.documents_skipped,
            documents_removed = report.documents_removed,
            chunks_written = report.chunks_written,
            total_chunks = report.total_chunks,
            rebuilt = report.rebuilt,
            "ingestion pipeline finished"
        );

        Ok(report)
    }

    #[instrument(skip_all, fields(source = %document.source))]
    async fn index_document(
        &self,
        document: &CorpusDocument,
        document_id: &str,
        splitter: &StatuteSplitter,
        fingerprint: &EmbeddingFingerprint,
    ) -> Result<usize, AppError> {
        let drafts = splitter.split(&document.content);
        let embeddings = self.embed_drafts(&drafts).await?;

        // Vectors are all checked before anything of this document is replaced.
        let expected = self.services.dimension();
        if let Some(bad) = embeddings.iter().find(|e| e.len() != expected) {
            return Err(AppError::Internal(format!(
                "embedding for {} has dimension {}, expected {expected}",
                document.source,
                bad.len()
            )));
        }

        TextChunk::delete_by_document_id(document_id, &self.db).await?;
        let chunk_count = drafts.len();
        for (ordinal, (draft, embedding)) in drafts.into_iter().zip(embeddings).enumerate() {
            let chunk = TextChunk::new(document_id, &document.source, ordinal, draft, embedding);
            self.db.upsert_item(chunk).await?;
        }

        self.db
            .upsert_item(LegalDocument::new(
                &document.source,
                &document.content,
                chunk_count,
                fingerprint.as_str(),
            ))
            .await?;

        info!(chunks = chunk_count, "indexed document");
        Ok(chunk_count)
    }

    async fn embed_drafts(&self, drafts: &[ChunkDraft]) -> Result<Vec<Vec<f32>>, AppError> {
        let mut embeddings = Vec::with_capacity(drafts.len());
        for batch in drafts.chunks(self.pipeline_config.tuning.embed_batch_size) {
            let texts = batch.iter().map(|draft| draft.text.clone()).collect();
            let vectors = self.services.embed_batch(texts).await?;
            if vectors.len() != batch.len() {
                return Err(AppError::Internal(format!(
                    "embedding backend returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }
            embeddings.extend(vectors);
        }
        Ok(embeddings)
    }

    async fn reset_store(&self) -> Result<(), AppError> {
        let query = format!(
            "DELETE {chunks}; DELETE {documents};",
            chunks = TextChunk::table_name(),
            documents = LegalDocument::table_name()
        );
        self.db.client.query(query).await?.check()?;
        IndexManifest::clear(&self.db).await?;
        Ok(())
    }
}
