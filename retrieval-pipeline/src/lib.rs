pub mod answer;
pub mod llm;
pub mod prompt;
pub mod scoring;

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::text_chunk::TextChunk},
    utils::embedding::EmbeddingProvider,
};
use tracing::{debug, instrument};

pub use answer::{Answer, AskOptions, LegalQaChain, SourceReference};

// A retrieved chunk plus its 0..1 similarity to the question.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: TextChunk,
    pub score: f32,
}

/// Embeds `question` and returns the `top_k` nearest chunks, best first.
#[instrument(skip_all, fields(top_k = top_k))]
pub async fn retrieve_chunks(
    db: &SurrealDbClient,
    provider: &EmbeddingProvider,
    question: &str,
    top_k: usize,
) -> Result<Vec<RetrievedChunk>, AppError> {
    let embedding = provider.embed(question).await?;
    retrieve_chunks_with_embedding(db, &embedding, top_k).await
}

pub async fn retrieve_chunks_with_embedding(
    db: &SurrealDbClient,
    embedding: &[f32],
    top_k: usize,
) -> Result<Vec<RetrievedChunk>, AppError> {
    let mut chunks: Vec<RetrievedChunk> = TextChunk::nearest(embedding, top_k, db)
        .await?
        .into_iter()
        .map(|hit| RetrievedChunk {
            score: scoring::cosine_distance_to_similarity(hit.distance),
            chunk: hit.chunk,
        })
        .collect();
    scoring::sort_by_score_desc(&mut chunks);

    debug!(
        hits = chunks.len(),
        best = chunks.first().map(|c| c.score),
        "Retrieved statute chunks"
    );

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::{indexes::ensure_chunk_indexes, types::text_chunk::ChunkDraft};
    use uuid::Uuid;

    #[tokio::test]
    async fn retrieves_most_similar_chunk_first() {
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory("test_ns", database)
            .await
            .expect("Failed to start in-memory surrealdb");
        let provider = EmbeddingProvider::new_hashed(64);
        ensure_chunk_indexes(&db, provider.dimension(), false)
            .await
            .expect("indexes");

        let texts = [
            "第三十六条 国家实行劳动者每日工作时间不超过八小时的工时制度。",
            "第五十条 工资应当以货币形式按月支付给劳动者本人。",
            "第六十八条 用人单位应当建立职业培训制度。",
        ];
        for (ordinal, text) in texts.iter().enumerate() {
            let embedding = provider.embed(text).await.expect("embed");
            let chunk = TextChunk::new(
                "labor_law_txt",
                "labor_law.txt",
                ordinal,
                ChunkDraft {
                    article: None,
                    article_number: None,
                    chapter: None,
                    text: (*text).to_string(),
                },
                embedding,
            );
            db.store_item(chunk).await.expect("store");
        }

        let hits = retrieve_chunks(&db, &provider, "工资应当以货币形式按月支付", 2)
            .await
            .expect("retrieve");

        assert_eq!(hits.len(), 2);
        let top = hits.first().expect("top hit");
        assert!(top.chunk.chunk.starts_with("第五十条"));
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.score)));
    }
}
