use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;

use crate::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{text_chunk::TextChunk, StoredObject},
    },
};

pub const CHUNK_VECTOR_INDEX: &str = "idx_embedding_text_chunk";
const CHUNK_DOCUMENT_INDEX: &str = "idx_text_chunk_document";
const HNSW_OPTIONS: &str = "DIST COSINE TYPE F32 EFC 100 M 8";

fn vector_index_definition(dimension: usize, overwrite: bool) -> String {
    let mode = if overwrite { "OVERWRITE" } else { "IF NOT EXISTS" };
    format!(
        "DEFINE INDEX {mode} {CHUNK_VECTOR_INDEX} ON TABLE {table} \
         FIELDS embedding HNSW DIMENSION {dimension} {HNSW_OPTIONS};",
        table = TextChunk::table_name(),
    )
}

/// Defines the per-document lookup index and the HNSW vector index.
///
/// The vector index is redefined when `force_overwrite` is set or when the
/// live one was built for another dimension.
pub async fn ensure_chunk_indexes(
    db: &SurrealDbClient,
    dimension: usize,
    force_overwrite: bool,
) -> Result<(), AppError> {
    define_chunk_indexes(db, dimension, force_overwrite)
        .await
        .map_err(|err| AppError::Internal(format!("{err:#}")))
}

async fn define_chunk_indexes(
    db: &SurrealDbClient,
    dimension: usize,
    force_overwrite: bool,
) -> Result<()> {
    let lookup = format!(
        "DEFINE INDEX IF NOT EXISTS {CHUNK_DOCUMENT_INDEX} ON TABLE {table} FIELDS document_id;",
        table = TextChunk::table_name()
    );
    db.client
        .query(lookup)
        .await
        .context("defining chunk document index")?
        .check()
        .context("chunk document index definition failed")?;

    let live = index_definition(db)
        .await?
        .as_deref()
        .and_then(extract_dimension);
    let stale = live.is_some_and(|existing| existing != dimension as u64);
    if stale {
        info!(
            index = CHUNK_VECTOR_INDEX,
            existing_dimension = live,
            target_dimension = dimension,
            "Redefining HNSW index for new embedding dimension"
        );
    }

    db.client
        .query(vector_index_definition(dimension, force_overwrite || stale))
        .await
        .context("creating chunk vector index")?
        .check()
        .context("chunk vector index definition failed")?;
    Ok(())
}

/// Dimension of the live vector index, if one is defined.
pub async fn vector_index_dimension(db: &SurrealDbClient) -> Result<Option<u64>, AppError> {
    let definition = index_definition(db)
        .await
        .map_err(|err| AppError::Internal(format!("{err:#}")))?;
    Ok(definition.as_deref().and_then(extract_dimension))
}

/// Raw `DEFINE INDEX` statement for the vector index, from `INFO FOR TABLE`.
async fn index_definition(db: &SurrealDbClient) -> Result<Option<String>> {
    let table = TextChunk::table_name();
    let info: surrealdb::Value = db
        .client
        .query(format!("INFO FOR TABLE {table};"))
        .await
        .with_context(|| format!("fetching table info for {table}"))?
        .take(0)
        .context("reading table info")?;
    let info = serde_json::to_value(info).context("converting table info")?;

    Ok(info
        .pointer(&format!("/Object/indexes/Object/{CHUNK_VECTOR_INDEX}/Strand"))
        .and_then(Value::as_str)
        .map(str::to_string))
}

fn extract_dimension(definition: &str) -> Option<u64> {
    let (_, rest) = definition.split_once("DIMENSION")?;
    rest.split_whitespace()
        .next()?
        .trim_end_matches(';')
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn extracts_dimension_from_definition() {
        assert_eq!(extract_dimension(&vector_index_definition(384, false)), Some(384));
        assert_eq!(extract_dimension(&vector_index_definition(1024, true)), Some(1024));
        assert_eq!(extract_dimension("DEFINE INDEX x ON t FIELDS a"), None);
    }

    #[test]
    fn definitions_use_cosine_distance() {
        let definition = vector_index_definition(8, false);
        assert!(definition.contains("HNSW DIMENSION 8"));
        assert!(definition.contains("DIST COSINE"));
        assert!(definition.starts_with("DEFINE INDEX IF NOT EXISTS"));
    }

    #[tokio::test]
    async fn ensure_is_idempotent_and_overwritable() {
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory("test_ns", database)
            .await
            .expect("Failed to start in-memory surrealdb");

        ensure_chunk_indexes(&db, 8, false).await.expect("first");
        ensure_chunk_indexes(&db, 8, false).await.expect("second");
        assert_eq!(vector_index_dimension(&db).await.expect("dimension"), Some(8));

        ensure_chunk_indexes(&db, 16, false).await.expect("redefine");
        assert_eq!(vector_index_dimension(&db).await.expect("dimension"), Some(16));

        ensure_chunk_indexes(&db, 16, true).await.expect("overwrite");
    }
}
