use serde::Serialize;

/// What one ingestion run did to the vector store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestionReport {
    pub documents_seen: usize,
    pub documents_indexed: usize,
    pub documents_skipped: usize,
    pub documents_removed: usize,
    pub chunks_written: usize,
    /// Chunks in the store once the run finished.
    pub total_chunks: usize,
    /// True when the whole store was wiped first.
    pub rebuilt: bool,
}

impl IngestionReport {
    pub fn changed_anything(&self) -> bool {
        self.rebuilt || self.documents_indexed > 0 || self.documents_removed > 0
    }
}
