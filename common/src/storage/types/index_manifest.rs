use crate::{
    error::AppError,
    storage::db::SurrealDbClient,
    stored_object,
    utils::embedding::{EmbeddingFingerprint, EmbeddingProvider, HASHED_MODEL_NAME},
};

stored_object!(
    /// How the vector store was last built. A single record, `index_manifest:current`.
    IndexManifest, "index_manifest", {
    backend: String,
    model: String,
    dimension: usize,
    fingerprint: String,
    document_count: usize,
    chunk_count: usize
});

const MANIFEST_ID: &str = "current";

impl IndexManifest {
    pub fn new(
        backend: &str,
        model: &str,
        dimension: usize,
        document_count: usize,
        chunk_count: usize,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: MANIFEST_ID.to_string(),
            created_at: now,
            updated_at: now,
            backend: backend.to_string(),
            model: model.to_string(),
            dimension,
            fingerprint: EmbeddingFingerprint::new(backend, model, dimension).to_string(),
            document_count,
            chunk_count,
        }
    }

    pub fn for_provider(
        provider: &EmbeddingProvider,
        document_count: usize,
        chunk_count: usize,
    ) -> Self {
        let model = provider
            .model_code()
            .unwrap_or_else(|| HASHED_MODEL_NAME.to_string());
        Self::new(
            provider.backend_label(),
            &model,
            provider.dimension(),
            document_count,
            chunk_count,
        )
    }

    pub async fn get_current(db: &SurrealDbClient) -> Result<Option<Self>, AppError> {
        Ok(db.get_item::<Self>(MANIFEST_ID).await?)
    }

    pub async fn save(self, db: &SurrealDbClient) -> Result<Self, AppError> {
        db.upsert_item(self)
            .await?
            .ok_or_else(|| AppError::Internal("index manifest was not written".into()))
    }

    pub async fn clear(db: &SurrealDbClient) -> Result<(), AppError> {
        db.delete_item::<Self>(MANIFEST_ID).await?;
        Ok(())
    }

    /// Query vectors must come from the model that built the index.
    pub fn ensure_compatible(&self, provider: &EmbeddingProvider) -> Result<(), AppError> {
        let current = provider.fingerprint();
        if self.fingerprint == current.as_str() {
            Ok(())
        } else {
            Err(AppError::EmbeddingMismatch {
                stored: self.fingerprint.clone(),
                current: current.to_string(),
            })
        }
    }

    /// Loads the manifest and checks it against `provider`. An absent
    /// manifest means nothing has been indexed yet.
    pub async fn require_compatible(
        db: &SurrealDbClient,
        provider: &EmbeddingProvider,
    ) -> Result<Self, AppError> {
        let manifest = Self::get_current(db).await?.ok_or_else(|| {
            AppError::NotFound(
                "the vector store is empty; run `legal-rag process` to index the corpus".into(),
            )
        })?;
        manifest.ensure_compatible(provider)?;
        Ok(manifest)
    }
}
