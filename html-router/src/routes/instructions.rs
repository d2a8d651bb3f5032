use axum::{extract::FromRef, response::IntoResponse, routing::get, Router};
use serde::Serialize;

use crate::{html_state::HtmlState, middlewares::response_middleware::TemplateResponse};

const EXAMPLE_QUESTIONS: [&str; 3] = [
    "劳动法适用于哪些单位和个人？",
    "劳动法第60条是什么？",
    "用人单位有什么义务？",
];

#[derive(Serialize)]
struct InstructionsData {
    examples: Vec<&'static str>,
}

pub async fn show_instructions() -> impl IntoResponse {
    TemplateResponse::new_template(
        "instructions.html",
        InstructionsData {
            examples: EXAMPLE_QUESTIONS.to_vec(),
        },
    )
}

pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    HtmlState: FromRef<S>,
{
    Router::new().route("/instructions", get(show_instructions))
}
