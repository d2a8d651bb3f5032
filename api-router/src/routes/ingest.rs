use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Default, Deserialize)]
pub struct IngestParams {
    #[serde(default)]
    pub force: bool,
}

/// Re-runs the embedding stage over the corpus directory.
pub async fn ingest_corpus(
    State(state): State<ApiState>,
    params: Option<Json<IngestParams>>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(params) = params.unwrap_or_default();
    info!(force = params.force, "Received ingestion request");

    let report = state.ingestion_pipeline.run(params.force).await?;

    Ok(Json(report))
}
