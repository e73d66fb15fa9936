use crate::lifecycle::Lifecycle;
use crate::stream::tag_parser::ParseResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn timestamp_millis() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis() as u64,
        Err(_) => 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Streaming,
    Complete,
    Error,
}

impl Lifecycle for MessageStatus {
    fn is_terminal(self) -> bool {
        !matches!(self, Self::Streaming)
    }

    fn allows(self, next: Self) -> bool {
        matches!(self, Self::Streaming)
            && matches!(next, Self::Streaming | Self::Complete | Self::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Code {
        language: Option<String>,
        code: String,
    },
    Image {
        alt: String,
        source: String,
    },
    ToolUse {
        tool_call: ToolCall,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thinking: String,
    #[serde(default)]
    pub blocks: Vec<ContentBlock>,
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    pub created_at: u64,
    pub updated_at: u64,
    /// Latest tag scan of `content`; rebuilt on load, never persisted.
    #[serde(skip)]
    pub parsed: ParseResult,
}

impl Message {
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn user(text: impl Into<String>) -> Self {
        let text = text.into();
        let now = timestamp_millis();
        let mut message = Self {
            id: Self::new_id(),
            role: Role::User,
            blocks: vec![ContentBlock::Text { text: text.clone() }],
            content: text,
            thinking: String::new(),
            status: MessageStatus::Complete,
            error: None,
            usage: None,
            created_at: now,
            updated_at: now,
            parsed: ParseResult::default(),
        };
        message.reparse();
        message
    }

    pub fn assistant_streaming() -> Self {
        let now = timestamp_millis();
        Self {
            id: Self::new_id(),
            role: Role::Assistant,
            content: String::new(),
            thinking: String::new(),
            blocks: Vec::new(),
            status: MessageStatus::Streaming,
            error: None,
            usage: None,
            created_at: now,
            updated_at: now,
            parsed: ParseResult::default(),
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.status == MessageStatus::Streaming
    }

    pub fn reparse(&mut self) {
        self.parsed = crate::stream::tag_parser::parse(&self.content);
    }

    pub fn tool_call(&self, tool_id: &str) -> Option<&ToolCall> {
        self.blocks.iter().find_map(|block| match block {
            ContentBlock::ToolUse { tool_call } if tool_call.id == tool_id => Some(tool_call),
            _ => None,
        })
    }

    /// Text shown in the chat bubble: tagged file blocks are lifted out.
    pub fn display_text(&self) -> &str {
        if self.parsed.blocks.is_empty() {
            &self.content
        } else {
            &self.parsed.plain_text
        }
    }
}

/// Splits finished text into prose, fenced code and standalone images.
pub fn segment_text(text: &str) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();
    let mut prose = String::new();
    let mut code: Option<(Option<String>, String)> = None;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim();
        if let Some((language, body)) = code.as_mut() {
            if trimmed.starts_with("```") {
                blocks.push(ContentBlock::Code {
                    language: language.take(),
                    code: std::mem::take(body),
                });
                code = None;
            } else {
                body.push_str(line);
            }
            continue;
        }

        if let Some(fence) = trimmed.strip_prefix("```") {
            flush_prose(&mut blocks, &mut prose);
            let language = Some(fence.trim().to_string()).filter(|language| !language.is_empty());
            code = Some((language, String::new()));
        } else if let Some((alt, source)) = markdown_image(trimmed) {
            flush_prose(&mut blocks, &mut prose);
            blocks.push(ContentBlock::Image {
                alt: alt.to_string(),
                source: source.to_string(),
            });
        } else {
            prose.push_str(line);
        }
    }

    // An unclosed fence keeps its body as code.
    if let Some((language, body)) = code {
        blocks.push(ContentBlock::Code { language, code: body });
    }
    flush_prose(&mut blocks, &mut prose);
    blocks
}

fn flush_prose(blocks: &mut Vec<ContentBlock>, prose: &mut String) {
    if prose.trim().is_empty() {
        prose.clear();
        return;
    }
    blocks.push(ContentBlock::Text {
        text: std::mem::take(prose),
    });
}

fn markdown_image(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix("![")?;
    let (alt, rest) = rest.split_once("](")?;
    let source = rest.strip_suffix(')')?;
    if source.is_empty() || source.contains(char::is_whitespace) {
        return None;
    }
    Some((alt, source))
}
