mod handlers;

use axum::{
    extract::FromRef,
    routing::{get, post},
    Router,
};
pub use handlers::{ask_question, clear_history, show_chat, ChatSettings, ChatTurn};

use crate::html_state::HtmlState;

pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    HtmlState: FromRef<S>,
{
    Router::new()
        .route("/", get(show_chat))
        .route("/ask", post(ask_question))
        .route("/clear", post(clear_history))
}
