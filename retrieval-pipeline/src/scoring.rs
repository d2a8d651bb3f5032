use std::cmp::Ordering;

use crate::RetrievedChunk;

pub const fn clamp_unit(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// Cosine distance (0 = identical) to a 0..1 similarity.
pub fn cosine_distance_to_similarity(distance: f32) -> f32 {
    if !distance.is_finite() {
        return 0.0;
    }
    clamp_unit(1.0 - distance)
}

/// Best match first; ties keep document order so output is stable.
pub fn sort_by_score_desc(chunks: &mut [RetrievedChunk]) {
    chunks.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk.document_id.cmp(&b.chunk.document_id))
            .then_with(|| a.chunk.ordinal.cmp(&b.chunk.ordinal))
    });
}
