//! Extraction of `<write_file path="...">...</write_file>` blocks from model output.
//!
//! Every call scans the whole buffer from the start. Callers re-run it on each
//! delta arrival with the full accumulated text, so a block's `content` only ever
//! grows between calls until its closing tag shows up.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static OPEN_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<write_file\s+path\s*=\s*(?:"([^"]*)"|'([^']*)')\s*>"#)
        .unwrap_or_else(|err| panic!("write_file open tag pattern is invalid: {err}"))
});

static CLOSE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</write_file\s*>")
        .unwrap_or_else(|err| panic!("write_file close tag pattern is invalid: {err}"))
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaggedBlock {
    pub path: String,
    pub content: String,
    pub is_complete: bool,
    /// Byte offset of the opening tag.
    pub start_index: usize,
    /// Byte offset just past the closing tag, or the buffer length while open.
    pub end_index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseResult {
    pub blocks: Vec<TaggedBlock>,
    pub plain_text: String,
    pub has_streaming_block: bool,
}

impl ParseResult {
    pub fn first_block(&self) -> Option<&TaggedBlock> {
        self.blocks.first()
    }
}

/// Parses `buffer` into tagged blocks and the plain text around them.
///
/// Never fails: anything that is not a well-formed opening tag with a
/// non-empty path stays in `plain_text`. Once a block is open, the first
/// closing tag after it ends the block, so an inner opening tag is kept
/// verbatim as content.
pub fn parse(buffer: &str) -> ParseResult {
    let mut result = ParseResult::default();
    let mut cursor = 0;
    let mut search_from = 0;

    while let Some(captures) = OPEN_TAG.captures_at(buffer, search_from) {
        let Some(open) = captures.get(0) else {
            break;
        };
        let path = captures
            .get(1)
            .or_else(|| captures.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        if path.is_empty() {
            search_from = open.end();
            continue;
        }

        result.plain_text.push_str(&buffer[cursor..open.start()]);
        let body_start = open.end();

        match CLOSE_TAG.find_at(buffer, body_start) {
            Some(close) => {
                result.blocks.push(TaggedBlock {
                    path: path.to_string(),
                    content: buffer[body_start..close.start()].to_string(),
                    is_complete: true,
                    start_index: open.start(),
                    end_index: close.end(),
                });
                cursor = close.end();
                search_from = cursor;
            }
            None => {
                result.blocks.push(TaggedBlock {
                    path: path.to_string(),
                    content: buffer[body_start..].to_string(),
                    is_complete: false,
                    start_index: open.start(),
                    end_index: buffer.len(),
                });
                result.has_streaming_block = true;
                return result;
            }
        }
    }

    result.plain_text.push_str(&buffer[cursor..]);
    result
}
