//! Extraction of program text from a free-form generation response.
//!
//! Grammar, line oriented:
//!
//! ```text
//! response := line*
//! fence    := ws* "```" info            -- any line whose trimmed form starts with ```
//! info     := tag? rest                 -- tag = first whitespace-separated word
//! block    := fence line* (fence | EOF) -- an unterminated block runs to end of input
//! ```
//!
//! Lines outside blocks are prose and ignored. Selection, first match wins:
//! 1. the first block tagged with the target language
//! 2. the first untagged block
//! 3. the only block, whatever its tag
//! 4. the whole response, trimmed

use autojudge_common::types::Language;

const FENCE: &str = "```";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub tag: Option<String>,
    pub body: String,
}

/// Split a response into its fenced blocks
pub fn parse_blocks(response: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut open: Option<(Option<String>, Vec<&str>)> = None;

    for line in response.lines() {
        let trimmed = line.trim();
        match (trimmed.strip_prefix(FENCE), open.take()) {
            (Some(_), Some((tag, lines))) => {
                blocks.push(CodeBlock {
                    tag,
                    body: lines.join("\n"),
                });
            }
            (Some(info), None) => {
                let tag = info
                    .trim_start_matches('`')
                    .split_whitespace()
                    .next()
                    .map(|t| t.to_lowercase());
                open = Some((tag, Vec::new()));
            }
            (None, Some((tag, mut lines))) => {
                lines.push(line);
                open = Some((tag, lines));
            }
            (None, None) => {}
        }
    }

    if let Some((tag, lines)) = open {
        blocks.push(CodeBlock {
            tag,
            body: lines.join("\n"),
        });
    }

    blocks
}

/// Program text for `language` out of a generation response
pub fn extract_code(response: &str, language: Language) -> String {
    let blocks = parse_blocks(response);
    let tags = language.fence_tags();

    let chosen = blocks
        .iter()
        .find(|b| b.tag.as_deref().is_some_and(|t| tags.contains(&t)))
        .or_else(|| blocks.iter().find(|b| b.tag.is_none()))
        .or_else(|| if blocks.len() == 1 { blocks.first() } else { None });

    match chosen {
        Some(block) => block.body.trim().to_string(),
        None => response.trim().to_string(),
    }
}
