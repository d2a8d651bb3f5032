use crate::{
    error::AppError,
    storage::{db::SurrealDbClient, types::text_chunk::TextChunk},
    stored_object,
    utils::text::sha256_hex,
};

stored_object!(LegalDocument, "legal_document", {
    /// File name inside the corpus directory.
    source: String,
    title: String,
    content_sha256: String,
    char_count: usize,
    chunk_count: usize,
    embedding_fingerprint: String
});

/// Hex digits of the source-name hash kept in a document id.
const SOURCE_HASH_LEN: usize = 12;

/// Stable record key for a corpus file: the sanitized name plus a short hash
/// of the exact name, so `labor-law.txt` and `labor_law.txt` stay distinct.
pub fn document_id_for(source: &str) -> String {
    let readable: String = source
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let digest = sha256_hex(source.as_bytes());
    format!("{readable}_{}", &digest[..SOURCE_HASH_LEN])
}

/// Title line of a statute: its first non-blank line.
pub fn title_of(content: &str) -> String {
    content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}

impl LegalDocument {
    pub fn new(source: &str, content: &str, chunk_count: usize, fingerprint: &str) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: document_id_for(source),
            created_at: now,
            updated_at: now,
            source: source.to_string(),
            title: title_of(content),
            content_sha256: sha256_hex(content.as_bytes()),
            char_count: content.chars().count(),
            chunk_count,
            embedding_fingerprint: fingerprint.to_string(),
        }
    }

    /// True when the stored record already reflects `content_sha256`
    /// embedded with `fingerprint`.
    pub fn is_current(&self, content_sha256: &str, fingerprint: &str) -> bool {
        self.content_sha256 == content_sha256 && self.embedding_fingerprint == fingerprint
    }

    pub async fn get_all(db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let mut documents: Vec<Self> = db.get_all_stored_items().await?;
        documents.sort_by(|a, b| a.source.cmp(&b.source));
        Ok(documents)
    }

    /// Removes the document record together with all of its chunks.
    pub async fn delete_with_chunks(id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        TextChunk::delete_by_document_id(id, db).await?;
        db.delete_item::<Self>(id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::text_chunk::ChunkDraft;
    use uuid::Uuid;

    const STATUTE: &str = "\n中华人民共和国劳动法\n第一章 总则\n第一条 为了保护劳动者的合法权益。\n";

    #[test]
    fn ids_are_stable_and_sanitized() {
        let id = document_id_for("labor-law.txt");
        assert!(id.starts_with("labor_law_txt_"));
        assert_eq!(id.len(), "labor_law_txt_".len() + SOURCE_HASH_LEN);
        assert!(document_id_for("劳动法.txt").starts_with("劳动法_txt_"));
        assert_eq!(document_id_for("a b.txt"), document_id_for("a b.txt"));
    }

    #[test]
    fn names_that_sanitize_alike_get_distinct_ids() {
        assert_ne!(document_id_for("labor-law.txt"), document_id_for("labor_law.txt"));
        assert_ne!(document_id_for("a.b.txt"), document_id_for("a_b.txt"));
    }

    #[test]
    fn new_document_captures_metadata() {
        let doc = LegalDocument::new("labor_law.txt", STATUTE, 2, "hashed:bag-of-tokens:8");
        assert_eq!(doc.id, document_id_for("labor_law.txt"));
        assert_eq!(doc.title, "中华人民共和国劳动法");
        assert_eq!(doc.content_sha256.len(), 64);
        assert!(doc.is_current(&sha256_hex(STATUTE.as_bytes()), "hashed:bag-of-tokens:8"));
        assert!(!doc.is_current(&sha256_hex(STATUTE.as_bytes()), "hashed:bag-of-tokens:16"));
        assert!(!doc.is_current("other", "hashed:bag-of-tokens:8"));
    }

    #[tokio::test]
    async fn delete_with_chunks_removes_everything() {
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory("test_ns", database)
            .await
            .expect("Failed to start in-memory surrealdb");

        let doc = LegalDocument::new("labor_law.txt", STATUTE, 1, "fp");
        db.upsert_item(doc.clone()).await.expect("store doc");
        let chunk = TextChunk::new(
            &doc.id,
            &doc.source,
            0,
            ChunkDraft {
                article: Some("第一条".into()),
                article_number: Some(1),
                chapter: Some("第一章 总则".into()),
                text: "第一条 为了保护劳动者的合法权益。".into(),
            },
            vec![1.0, 0.0],
        );
        db.upsert_item(chunk).await.expect("store chunk");

        LegalDocument::delete_with_chunks(&doc.id, &db)
            .await
            .expect("delete");

        assert!(LegalDocument::get_all(&db).await.expect("docs").is_empty());
        assert_eq!(TextChunk::count(&db).await.expect("count"), 0);
    }
}
