use serde::Deserialize;
use tracing::debug;

use crate::{
    error::AppError,
    storage::{db::SurrealDbClient, types::StoredObject},
    stored_object,
};

/// Smallest HNSW candidate list used for a search.
const MIN_SEARCH_EF: usize = 40;

stored_object!(
    /// One retrievable span of a statute, usually a single article.
    TextChunk, "text_chunk", {
    document_id: String,
    source: String,
    ordinal: usize,
    /// Article label such as `第六十条`, absent for preambles.
    article: Option<String>,
    article_number: Option<u32>,
    /// Chapter heading in force where the article appears.
    chapter: Option<String>,
    chunk: String,
    embedding: Vec<f32>
});

/// Chunk content before it has been embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDraft {
    pub article: Option<String>,
    pub article_number: Option<u32>,
    pub chapter: Option<String>,
    pub text: String,
}

/// Search hit: the chunk plus cosine distance to the query.
#[derive(Debug, Clone)]
pub struct ChunkMatch {
    pub chunk: TextChunk,
    pub distance: f32,
}

/// Chunk ids are derived from the document and position, so re-running
/// ingestion on the same text rewrites the same records.
pub fn chunk_id(document_id: &str, ordinal: usize) -> String {
    format!("{document_id}_{ordinal}")
}

impl TextChunk {
    pub fn new(
        document_id: &str,
        source: &str,
        ordinal: usize,
        draft: ChunkDraft,
        embedding: Vec<f32>,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: chunk_id(document_id, ordinal),
            created_at: now,
            updated_at: now,
            document_id: document_id.to_string(),
            source: source.to_string(),
            ordinal,
            article: draft.article,
            article_number: draft.article_number,
            chapter: draft.chapter,
            chunk: draft.text,
            embedding,
        }
    }

    pub async fn delete_by_document_id(
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let query = format!(
            "DELETE {} WHERE document_id = $document_id",
            Self::table_name()
        );
        db.client
            .query(query)
            .bind(("document_id", document_id.to_owned()))
            .await
            .map_err(AppError::Database)?
            .check()
            .map_err(AppError::Database)?;

        Ok(())
    }

    pub async fn list_by_document_id(
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let query = format!(
            "SELECT * FROM {} WHERE document_id = $document_id ORDER BY ordinal",
            Self::table_name()
        );
        let mut res = db
            .client
            .query(query)
            .bind(("document_id", document_id.to_owned()))
            .await?;
        Ok(res.take(0)?)
    }

    pub async fn count(db: &SurrealDbClient) -> Result<usize, AppError> {
        #[derive(Deserialize)]
        struct CountRow {
            count: usize,
        }

        let query = format!("SELECT count() AS count FROM {} GROUP ALL", Self::table_name());
        let mut res = db.client.query(query).await?;
        let rows: Vec<CountRow> = res.take(0)?;
        Ok(rows.first().map_or(0, |row| row.count))
    }

    /// The `take` chunks nearest to `embedding` through the HNSW index,
    /// closest first.
    pub async fn nearest(
        embedding: &[f32],
        take: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<ChunkMatch>, AppError> {
        if take == 0 {
            return Ok(Vec::new());
        }

        // HNSW yields at most `ef` candidates, so the width grows with `take`.
        let ef = take.saturating_mul(2).max(MIN_SEARCH_EF);
        let query = format!(
            "SELECT *, vector::distance::knn() AS distance FROM {table} \
             WHERE embedding <|{take},{ef}|> $embedding ORDER BY distance",
            table = Self::table_name(),
        );
        let mut res = db
            .client
            .query(query)
            .bind(("embedding", embedding.to_vec()))
            .await?;
        let chunks: Vec<Self> = res.take(0)?;

        debug!(requested = take, returned = chunks.len(), "Vector search finished");

        Ok(chunks
            .into_iter()
            .map(|chunk| {
                let distance = cosine_distance(embedding, &chunk.embedding);
                ChunkMatch { chunk, distance }
            })
            .collect())
    }
}

/// `1 - cosine similarity`; vectors of different length are maximally far apart.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}
