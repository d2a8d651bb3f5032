use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use common::storage::types::{index_manifest::IndexManifest, text_chunk::TextChunk};
use serde_json::json;

use crate::api_state::ApiState;

/// Liveness probe: the process is up.
pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

/// Readiness probe: 200 once the database answers and holds a usable index,
/// else 503 with the failing checks.
pub async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    if let Err(e) = state.db.ping().await {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "error",
                "checks": { "db": "fail", "index": "unknown" },
                "reason": e.to_string()
            })),
        );
    }

    let index_check = match IndexManifest::require_compatible(&state.db, &state.embedding_provider)
        .await
    {
        Ok(_) => match TextChunk::count(&state.db).await {
            Ok(0) => Err("vector store holds no chunks".to_string()),
            Ok(_) => Ok(()),
            Err(e) => Err(e.to_string()),
        },
        Err(e) => Err(e.to_string()),
    };

    match index_check {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "checks": { "db": "ok", "index": "ok" }
            })),
        ),
        Err(reason) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "error",
                "checks": { "db": "ok", "index": "fail" },
                "reason": reason
            })),
        ),
    }
}
