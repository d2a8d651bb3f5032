//! Splits statute text into article sized chunks.

use std::sync::LazyLock;

use common::{
    error::AppError,
    storage::types::text_chunk::ChunkDraft,
    utils::text::{article_label, collapse_whitespace, parse_chinese_numeral},
};
use regex::Regex;
use text_splitter::{ChunkCapacity, ChunkConfig, TextSplitter};
use tracing::debug;

/// Longer lines starting with `第…章` are prose, not headings.
const MAX_HEADING_CHARS: usize = 40;

const NUMERAL: &str = "[零〇一二三四五六七八九十百千两0-9０-９]+";

#[allow(clippy::expect_used)]
static ARTICLE_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^\s*第({NUMERAL})条")).expect("valid article heading regex")
});

#[allow(clippy::expect_used)]
static DIVISION_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^\s*第{NUMERAL}([编章节])")).expect("valid division heading regex")
});

/// Character bounds for chunks that are cut without regard to articles.
#[derive(Debug, Clone, Copy)]
pub struct ChunkBounds {
    pub min_chars: usize,
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkBounds {
    fn default() -> Self {
        Self {
            min_chars: 500,
            max_chars: 1000,
            overlap_chars: 200,
        }
    }
}

/// Heading context while walking the statute: `编`/`章` and `节`.
#[derive(Default)]
struct Divisions {
    chapter: Option<String>,
    section: Option<String>,
}

impl Divisions {
    fn enter(&mut self, kind: &str, heading: String) {
        if kind == "节" {
            self.section = Some(heading);
        } else {
            self.chapter = Some(heading);
            self.section = None;
        }
    }

    fn label(&self) -> Option<String> {
        match (&self.chapter, &self.section) {
            (Some(chapter), Some(section)) => Some(format!("{chapter} {section}")),
            (Some(chapter), None) => Some(chapter.clone()),
            (None, Some(section)) => Some(section.clone()),
            (None, None) => None,
        }
    }
}

/// Lines collected under one heading. `label` is `None` for the preamble and
/// for loose text following a chapter heading.
struct Block {
    label: Option<String>,
    number: Option<u32>,
    chapter: Option<String>,
    lines: Vec<String>,
}

pub struct StatuteSplitter {
    bounds: ChunkBounds,
    fallback: TextSplitter<text_splitter::Characters>,
}

impl StatuteSplitter {
    pub fn new(bounds: ChunkBounds) -> Result<Self, AppError> {
        if bounds.min_chars == 0 || bounds.max_chars == 0 || bounds.min_chars > bounds.max_chars {
            return Err(AppError::Validation(
                "invalid chunk bounds; ensure 0 < min <= max".into(),
            ));
        }
        if bounds.overlap_chars >= bounds.min_chars {
            return Err(AppError::Validation(format!(
                "chunk_min_chars must be greater than the configured overlap of {}",
                bounds.overlap_chars
            )));
        }

        let capacity = ChunkCapacity::new(bounds.min_chars)
            .with_max(bounds.max_chars)
            .map_err(|e| AppError::Validation(format!("invalid chunk bounds: {e}")))?;
        let config = ChunkConfig::new(capacity)
            .with_overlap(bounds.overlap_chars)
            .map_err(|e| AppError::Validation(format!("invalid chunk overlap: {e}")))?;

        Ok(Self {
            bounds,
            fallback: TextSplitter::new(config),
        })
    }

    /// One draft per article, preceded by the preamble when there is one.
    ///
    /// Articles longer than the maximum are cut further, keeping their label.
    /// Text without any article headings is cut purely by size.
    pub fn split(&self, text: &str) -> Vec<ChunkDraft> {
        let mut divisions = Divisions::default();
        let mut blocks: Vec<Block> = Vec::new();
        // A division heading closes the block before it.
        let mut block_open = false;

        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(caps) = DIVISION_HEADING
                .captures(line)
                .filter(|_| line.chars().count() <= MAX_HEADING_CHARS)
            {
                let kind = caps.get(1).map_or("章", |m| m.as_str());
                divisions.enter(kind, collapse_whitespace(line));
                block_open = false;
                continue;
            }

            if let Some(caps) = ARTICLE_HEADING.captures(line) {
                let raw_number = caps.get(1).map_or("", |m| m.as_str());
                let number = parse_numeral(raw_number);
                let label = number.map_or_else(|| format!("第{raw_number}条"), article_label);
                blocks.push(Block {
                    label: Some(label),
                    number,
                    chapter: divisions.label(),
                    lines: vec![line.to_string()],
                });
                block_open = true;
                continue;
            }

            match blocks.last_mut() {
                Some(block) if block_open => block.lines.push(line.to_string()),
                _ => {
                    blocks.push(Block {
                        label: None,
                        number: None,
                        chapter: divisions.label(),
                        lines: vec![line.to_string()],
                    });
                    block_open = true;
                }
            }
        }

        if blocks.iter().all(|block| block.label.is_none()) {
            debug!("No article headings found; splitting by size");
            let whole = blocks
                .iter()
                .flat_map(|block| block.lines.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join("\n");
            return self.split_plain(&whole, None, None, None);
        }

        let mut drafts = Vec::new();
        for block in blocks {
            let body = block.lines.join("\n");
            if body.chars().count() <= self.bounds.max_chars {
                drafts.push(ChunkDraft {
                    article: block.label,
                    article_number: block.number,
                    chapter: block.chapter,
                    text: body,
                });
            } else {
                drafts.extend(self.split_plain(
                    &body,
                    block.label.as_deref(),
                    block.number,
                    block.chapter.as_deref(),
                ));
            }
        }
        drafts
    }

    fn split_plain(
        &self,
        text: &str,
        article: Option<&str>,
        article_number: Option<u32>,
        chapter: Option<&str>,
    ) -> Vec<ChunkDraft> {
        self.fallback
            .chunks(text)
            .map(str::trim)
            .filter(|piece| !piece.is_empty())
            .map(|piece| ChunkDraft {
                article: article.map(str::to_string),
                article_number,
                chapter: chapter.map(str::to_string),
                text: piece.to_string(),
            })
            .collect()
    }
}

/// Like `parse_chinese_numeral`, also accepting full-width digits.
fn parse_numeral(raw: &str) -> Option<u32> {
    let normalized: String = raw
        .chars()
        .map(|c| match c {
            '０'..='９' => char::from_u32(u32::from(c) - u32::from('０') + u32::from('0')).unwrap_or(c),
            other => other,
        })
        .collect();
    parse_chinese_numeral(&normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABOR_LAW: &str = "中华人民共和国劳动法
（1994年7月5日第八届全国人民代表大会常务委员会第八次会议通过）

第一章　总　则

第一条　为了保护劳动者的合法权益，调整劳动关系，根据宪法，制定本法。
第二条　在中华人民共和国境内的企业、个体经济组织和与之形成劳动关系的劳动者，适用本法。
国家机关、事业组织、社会团体和与之建立劳动合同关系的劳动者，依照本法执行。

第四章　工作时间和休息休假

第三十六条　国家实行劳动者每日工作时间不超过八小时、平均每周工作时间不超过四十四小时的工时制度。
第六十条 依照本法第三十六条的规定执行。
";

    fn splitter() -> StatuteSplitter {
        StatuteSplitter::new(ChunkBounds::default()).expect("bounds")
    }

    #[test]
    fn splits_into_preamble_and_articles() {
        let drafts = splitter().split(LABOR_LAW);

        let labels: Vec<Option<&str>> = drafts.iter().map(|d| d.article.as_deref()).collect();
        assert_eq!(
            labels,
            vec![None, Some("第一条"), Some("第二条"), Some("第三十六条"), Some("第六十条")]
        );

        let preamble = drafts.first().expect("preamble");
        assert!(preamble.text.starts_with("中华人民共和国劳动法"));
        assert!(preamble.chapter.is_none());

        let second = drafts.get(2).expect("second article");
        assert_eq!(second.article_number, Some(2));
        assert!(second.text.contains("依照本法执行"));
        assert_eq!(second.chapter.as_deref(), Some("第一章 总 则"));

        let thirty_sixth = drafts.get(3).expect("article 36");
        assert_eq!(thirty_sixth.chapter.as_deref(), Some("第四章 工作时间和休息休假"));
    }

    #[test]
    fn cross_references_do_not_start_articles() {
        let drafts = splitter().split(LABOR_LAW);
        let last = drafts.last().expect("last");
        assert_eq!(last.article.as_deref(), Some("第六十条"));
        assert!(last.text.contains("第三十六条的规定"));
    }

    #[test]
    fn chapter_headings_close_the_current_article() {
        let drafts = splitter().split("第一条 甲\n第二章 罚则\n本章适用于用人单位。\n第二条 乙");
        let labels: Vec<Option<&str>> = drafts.iter().map(|d| d.article.as_deref()).collect();
        assert_eq!(labels, vec![Some("第一条"), None, Some("第二条")]);
        assert_eq!(drafts.first().map(|d| d.text.as_str()), Some("第一条 甲"));
        assert_eq!(
            drafts.get(1).and_then(|d| d.chapter.as_deref()),
            Some("第二章 罚则")
        );
    }

    #[test]
    fn digit_headings_are_normalized() {
        let drafts = splitter().split("第60条 甲\n第１０条 乙");
        let labels: Vec<Option<&str>> = drafts.iter().map(|d| d.article.as_deref()).collect();
        assert_eq!(labels, vec![Some("第六十条"), Some("第十条")]);
        assert_eq!(drafts.last().and_then(|d| d.article_number), Some(10));
    }

    #[test]
    fn sections_extend_chapter_label() {
        let drafts = splitter().split("第三章 劳动合同\n第一节 订立\n第十六条 内容\n第四章 工资\n第四十六条 内容");
        let chapters: Vec<Option<&str>> = drafts.iter().map(|d| d.chapter.as_deref()).collect();
        assert_eq!(
            chapters,
            vec![Some("第三章 劳动合同 第一节 订立"), Some("第四章 工资")]
        );
    }

    #[test]
    fn long_articles_are_cut_and_keep_their_label() {
        let bounds = ChunkBounds {
            min_chars: 40,
            max_chars: 60,
            overlap_chars: 10,
        };
        let body = "用人单位应当依法建立和完善规章制度，保障劳动者享有劳动权利和履行劳动义务。".repeat(6);
        let text = format!("第四条 {body}");
        let drafts = StatuteSplitter::new(bounds).expect("bounds").split(&text);

        assert!(drafts.len() > 1);
        assert!(drafts.iter().all(|d| d.article.as_deref() == Some("第四条")));
        assert!(drafts.iter().all(|d| d.text.chars().count() <= 60));
    }

    #[test]
    fn text_without_articles_falls_back_to_size_chunks() {
        let bounds = ChunkBounds {
            min_chars: 20,
            max_chars: 30,
            overlap_chars: 5,
        };
        let text = "这是一份没有条文编号的说明材料，用于测试按长度切分的行为。".repeat(3);
        let drafts = StatuteSplitter::new(bounds).expect("bounds").split(&text);

        assert!(drafts.len() > 1);
        assert!(drafts.iter().all(|d| d.article.is_none()));
        assert!(drafts.iter().all(|d| !d.text.is_empty()));
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(splitter().split("  \n\n ").is_empty());
    }

    #[test]
    fn rejects_invalid_bounds() {
        let bad = ChunkBounds {
            min_chars: 100,
            max_chars: 50,
            overlap_chars: 10,
        };
        assert!(matches!(StatuteSplitter::new(bad), Err(AppError::Validation(_))));
        let overlap = ChunkBounds {
            min_chars: 100,
            max_chars: 200,
            overlap_chars: 100,
        };
        assert!(StatuteSplitter::new(overlap).is_err());
    }
}
