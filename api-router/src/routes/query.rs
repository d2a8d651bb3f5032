use axum::{extract::State, response::IntoResponse, Json};
use retrieval_pipeline::AskOptions;
use serde::Deserialize;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    pub question: String,
    #[serde(flatten)]
    pub options: AskOptions,
}

pub async fn query_statutes(
    State(state): State<ApiState>,
    Json(params): Json<QueryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let answer = state.qa_chain.ask(&params.question, params.options).await?;

    Ok(Json(answer))
}
