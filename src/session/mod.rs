use crate::canvas::workspace::CanvasWorkspaceState;
use crate::stream::message::Message;
use serde::{Deserialize, Serialize};

pub mod store;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    pub schema_version: u32,
    pub session_id: String,
    pub title: Option<String>,
    pub created_at: u64,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub canvas_workspace: CanvasWorkspaceState,
}

impl SessionMeta {
    pub fn new(session_id: String, created_at: u64) -> Self {
        let title = Some(format!(
            "Session {}",
            session_id.chars().take(8).collect::<String>()
        ));
        Self {
            schema_version: SCHEMA_VERSION,
            session_id,
            title,
            created_at,
            messages: Vec::new(),
            canvas_workspace: CanvasWorkspaceState::default(),
        }
    }

    /// Names the session after its first prompt.
    pub fn title_from_prompt(&mut self, prompt: &str) {
        if !self.messages.is_empty() {
            return;
        }
        let title: String = prompt.trim().chars().take(40).collect();
        if !title.is_empty() {
            self.title = Some(title);
        }
    }
}

/// A slice of persisted messages, oldest first.
#[derive(Debug, Clone)]
pub struct HistoryPage {
    pub messages: Vec<Message>,
    /// Index of the first returned message in the persisted list.
    pub start: usize,
    pub has_more: bool,
}

impl HistoryPage {
    /// The `limit` messages right before index `end`.
    pub fn slice(messages: &[Message], end: usize, limit: usize) -> Self {
        let end = end.min(messages.len());
        let start = end.saturating_sub(limit);
        Self {
            messages: messages[start..end].to_vec(),
            start,
            has_more: start > 0,
        }
    }
}
