//! Language models that turn a grounded prompt into an answer.

use std::{
    sync::{Arc, LazyLock},
    time::Duration,
};

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
        CreateChatCompletionResponse,
    },
    Client,
};
use async_trait::async_trait;
use common::{
    error::AppError,
    utils::{
        config::{AppConfig, LlmBackend},
        text::{article_label, parse_chinese_numeral, truncate_chars},
    },
};
use regex::Regex;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};
use tracing::{debug, warn};

use crate::{
    prompt::{REFUSAL, SYSTEM_INSTRUCTIONS},
    RetrievedChunk,
};

/// Chat completion calls per question, the first try included.
const GENERATION_ATTEMPTS: usize = 3;

/// Delays between chat completion attempts.
fn generation_backoff() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(100)
        .map(jitter)
        .take(GENERATION_ATTEMPTS.saturating_sub(1))
}

#[allow(clippy::expect_used)]
static ARTICLE_IN_QUESTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"第([零〇一二三四五六七八九十百千两\d]+)条").expect("valid article regex")
});

/// Everything a model may use to answer one question.
pub struct GenerationRequest<'a> {
    pub question: &'a str,
    pub context: &'a str,
    pub prompt: &'a str,
    pub chunks: &'a [RetrievedChunk],
    pub temperature: f32,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Short name shown in the UI and logs.
    fn label(&self) -> String;

    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, AppError>;
}

/// Builds the model selected by `llm_backend`.
pub fn language_model_from_config(
    config: &AppConfig,
    openai_client: Option<Arc<Client<OpenAIConfig>>>,
) -> Result<Arc<dyn LanguageModel>, AppError> {
    match config.llm_backend {
        LlmBackend::Extractive => Ok(Arc::new(ExtractiveModel::new(config.law_title.clone()))),
        LlmBackend::OpenAI => {
            let client = openai_client.ok_or_else(|| {
                AppError::Validation("openai llm backend needs an API client".into())
            })?;
            Ok(Arc::new(OpenAiChatModel::new(
                client,
                config.query_model.clone(),
            )))
        }
    }
}

/// Statute article number named in a question (`第60条`, `第六十条`).
pub fn requested_article(question: &str) -> Option<u32> {
    ARTICLE_IN_QUESTION
        .captures(question)
        .and_then(|caps| caps.get(1))
        .and_then(|m| parse_chinese_numeral(m.as_str()))
}

/// Answers without any network access by quoting the retrieved statute text.
///
/// A question naming an article gets that article verbatim when it was
/// retrieved; other questions get the leading part of the context.
pub struct ExtractiveModel {
    law_title: String,
}

impl ExtractiveModel {
    pub fn new(law_title: String) -> Self {
        Self { law_title }
    }

    fn answer(&self, question: &str, context: &str, chunks: &[RetrievedChunk]) -> String {
        if context.trim().chars().count() < 10 {
            return REFUSAL.to_string();
        }

        let flattened = context.replace("\n\n", " ").replace('\n', " ");

        let Some(number) = requested_article(question) else {
            return format!("根据相关法律条款，{}", ellipsize(&flattened, 200));
        };

        let label = article_label(number);
        let quoted = chunks
            .iter()
            .find(|retrieved| retrieved.chunk.article_number == Some(number))
            .map(|retrieved| retrieved.chunk.chunk.trim().to_string())
            .or_else(|| {
                context
                    .lines()
                    .find(|line| line.contains(&label))
                    .map(|line| line.trim().to_string())
            });

        match quoted {
            Some(text) => format!("《{}》{label}规定：\n\n{text}", self.law_title),
            None => format!(
                "抱歉，未能找到《{}》{label}的完整内容。但根据相关法律规定：\n\n{}",
                self.law_title,
                ellipsize(&flattened, 250)
            ),
        }
    }
}

fn ellipsize(text: &str, max_chars: usize) -> String {
    let cut = truncate_chars(text, max_chars);
    if cut.ends_with("...") {
        cut
    } else {
        format!("{cut}...")
    }
}

#[async_trait]
impl LanguageModel for ExtractiveModel {
    fn label(&self) -> String {
        "extractive".to_string()
    }

    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, AppError> {
        Ok(self.answer(request.question, request.context, request.chunks))
    }
}

/// Chat completion against any OpenAI compatible endpoint.
pub struct OpenAiChatModel {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiChatModel {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: String) -> Self {
        Self { client, model }
    }
}

pub fn create_chat_request(
    model: &str,
    prompt: &str,
    temperature: f32,
) -> Result<CreateChatCompletionRequest, OpenAIError> {
    CreateChatCompletionRequestArgs::default()
        .model(model)
        .temperature(temperature)
        .messages([
            ChatCompletionRequestSystemMessage::from(SYSTEM_INSTRUCTIONS.to_string()).into(),
            ChatCompletionRequestUserMessage::from(prompt.to_string()).into(),
        ])
        .build()
}

pub fn process_llm_response(response: CreateChatCompletionResponse) -> Result<String, AppError> {
    response
        .choices
        .first()
        .and_then(|choice| choice.message.content.as_ref())
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or(AppError::Generation(
            "No content found in LLM response".into(),
        ))
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    fn label(&self) -> String {
        self.model.clone()
    }

    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, AppError> {
        let chat_request = create_chat_request(&self.model, request.prompt, request.temperature)?;

        let response = Retry::spawn(generation_backoff(), || async {
            self.client
                .chat()
                .create(chat_request.clone())
                .await
                .inspect_err(|err| warn!(error = %err, model = %self.model, "Chat completion failed"))
        })
        .await?;

        debug!(model = %self.model, "Chat completion received");
        process_llm_response(response)
    }
}
