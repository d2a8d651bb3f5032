use axum::{extract::State, response::IntoResponse, Form};
use axum_htmx::HxRequest;
use retrieval_pipeline::{AskOptions, SourceReference};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

use crate::{
    html_state::HtmlState,
    middlewares::response_middleware::{HtmlError, TemplateResponse},
    SessionType,
};

const HISTORY_KEY: &str = "chat_history";
const SETTINGS_KEY: &str = "chat_settings";
const MAX_HISTORY_TURNS: usize = 50;

/// One question and its answer, as kept in the visitor's session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
    pub model: String,
    pub sources: Vec<SourceReference>,
}

/// Sidebar values, remembered between questions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatSettings {
    pub temperature: f32,
    pub show_sources: bool,
}

#[derive(Serialize)]
pub struct ChatPageData {
    history: Vec<ChatTurn>,
    settings: ChatSettings,
}

#[derive(Debug, Deserialize)]
pub struct AskForm {
    question: String,
    /// Blank when the slider was not rendered; falls back to the session.
    #[serde(default, deserialize_with = "blank_as_none")]
    temperature: Option<f32>,
    /// Checkbox: present ("on") when checked, absent otherwise.
    #[serde(default)]
    show_sources: Option<String>,
}

fn parse_optional_f32(raw: &str) -> Result<Option<f32>, std::num::ParseFloatError> {
    match raw.trim() {
        "" => Ok(None),
        value => value.parse().map(Some),
    }
}

fn blank_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f32>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.as_deref()
        .map_or(Ok(None), parse_optional_f32)
        .map_err(serde::de::Error::custom)
}

fn load_history(session: &SessionType) -> Vec<ChatTurn> {
    session.get::<Vec<ChatTurn>>(HISTORY_KEY).unwrap_or_default()
}

fn load_settings(session: &SessionType, state: &HtmlState) -> ChatSettings {
    session
        .get::<ChatSettings>(SETTINGS_KEY)
        .unwrap_or_else(|| ChatSettings {
            temperature: state.qa_chain.default_temperature(),
            show_sources: true,
        })
}

pub async fn show_chat(
    State(state): State<HtmlState>,
    session: SessionType,
) -> Result<impl IntoResponse, HtmlError> {
    Ok(TemplateResponse::new_template(
        "chat/base.html",
        ChatPageData {
            history: load_history(&session),
            settings: load_settings(&session, &state),
        },
    ))
}

pub async fn ask_question(
    State(state): State<HtmlState>,
    HxRequest(is_htmx): HxRequest,
    session: SessionType,
    Form(form): Form<AskForm>,
) -> Result<impl IntoResponse, HtmlError> {
    let settings = ChatSettings {
        temperature: form
            .temperature
            .unwrap_or_else(|| load_settings(&session, &state).temperature),
        show_sources: form.show_sources.is_some(),
    };
    session.set(SETTINGS_KEY, &settings);

    let answer = state
        .qa_chain
        .ask(
            &form.question,
            AskOptions {
                temperature: Some(settings.temperature),
                show_sources: settings.show_sources,
                top_k: None,
            },
        )
        .await?;
    info!(
        sources = answer.sources.len(),
        chars = answer.answer.chars().count(),
        "Answered question from web chat"
    );

    let mut history = load_history(&session);
    history.push(ChatTurn {
        question: answer.question,
        answer: answer.answer,
        model: answer.model,
        sources: answer.sources,
    });
    let overflow = history.len().saturating_sub(MAX_HISTORY_TURNS);
    history.drain(..overflow);
    session.set(HISTORY_KEY, &history);

    if !is_htmx {
        return Ok(TemplateResponse::redirect("/"));
    }
    Ok(TemplateResponse::new_partial(
        "chat/base.html",
        "messages",
        ChatPageData { history, settings },
    ))
}

pub async fn clear_history(
    State(state): State<HtmlState>,
    HxRequest(is_htmx): HxRequest,
    session: SessionType,
) -> Result<impl IntoResponse, HtmlError> {
    session.remove(HISTORY_KEY);

    if !is_htmx {
        return Ok(TemplateResponse::redirect("/"));
    }
    Ok(TemplateResponse::new_partial(
        "chat/base.html",
        "messages",
        ChatPageData {
            history: Vec::new(),
            settings: load_settings(&session, &state),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_numbers_read_as_unset() {
        assert_eq!(parse_optional_f32(""), Ok(None));
        assert_eq!(parse_optional_f32("  "), Ok(None));
        assert_eq!(parse_optional_f32("0.35"), Ok(Some(0.35)));
        assert!(parse_optional_f32("warm").is_err());
    }
}
