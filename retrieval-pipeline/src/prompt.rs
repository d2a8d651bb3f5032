//! Prompt assembly for statute question answering.

use common::utils::text::collapse_whitespace;

use crate::RetrievedChunk;

/// Returned whenever the retrieved articles cannot answer the question.
pub const REFUSAL: &str = "根据提供的法律法规信息，无法找到与您问题直接相关的具体条款。建议您咨询专业的法律顾问获取更准确的信息。";

/// Role and grounding rules sent as the system message to chat models.
pub const SYSTEM_INSTRUCTIONS: &str = "你是一个专业的中国劳动法律师。请根据已知信息，简洁、准确地回答用户的问题。严格禁止在已知信息之外进行任何补充或想象。";

pub const TASK_SECTION: &str = "[任务]";
pub const CONTEXT_SECTION: &str = "[已知信息]";
pub const QUESTION_SECTION: &str = "[问题]";
pub const ANSWER_SECTION: &str = "[回答]";

/// Label used for chunks that do not start with an article heading.
pub const GENERIC_ARTICLE: &str = "相关条款";

pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "{TASK_SECTION}\n\
         {SYSTEM_INSTRUCTIONS}\n\
         如果已知信息与问题不相关，或者无法从已知信息中找到答案，请直接回答：\"{REFUSAL}\"\n\
         \n\
         {CONTEXT_SECTION}\n\
         {context}\n\
         \n\
         {QUESTION_SECTION}\n\
         {question}\n\
         \n\
         {ANSWER_SECTION}\n"
    )
}

/// True when `text` opens with an article heading such as `第十条`.
fn starts_with_article(text: &str) -> bool {
    text.starts_with('第') && text.chars().take(15).any(|c| c == '条')
}

/// Joins retrieved chunks into the `[已知信息]` block. Articles keep their
/// line layout; anything else is flattened onto one line.
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|retrieved| {
            let content = retrieved.chunk.chunk.trim();
            if starts_with_article(content) {
                content.to_string()
            } else {
                content.replace("\n\n", " ").replace('\n', " ")
            }
        })
        .filter(|content| !content.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Article label shown next to a source excerpt.
pub fn display_article(retrieved: &RetrievedChunk) -> String {
    retrieved
        .chunk
        .article
        .clone()
        .unwrap_or_else(|| GENERIC_ARTICLE.to_string())
}

/// Source excerpt with whitespace runs collapsed.
pub fn display_content(retrieved: &RetrievedChunk) -> String {
    collapse_whitespace(&retrieved.chunk.chunk)
}
