//! Applies transport events to the conversation's single streaming message.
//!
//! All mutation of an assistant message happens here while it is `Streaming`.
//! `finish_active` is the only way out of that state.

use crate::error::ChatError;
use crate::event::StreamEvent;
use crate::lifecycle::Lifecycle;
use crate::stream::tag_parser::ParseResult;
use crate::stream::message::{
    segment_text, timestamp_millis, ContentBlock, Message, MessageStatus, Role, ToolCall,
    ToolStatus,
};
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    /// The event targeted a message that is not streaming.
    Dropped,
    Unchanged,
    /// Visible text grew; the tag scan must run again.
    ContentChanged,
    Updated,
    Finished(MessageStatus),
}

#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    active_id: Option<String>,
}

impl Conversation {
    pub fn from_messages(messages: Vec<Message>) -> Self {
        let mut messages = messages;
        messages.iter_mut().for_each(restore_persisted);
        Self {
            messages,
            active_id: None,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn is_streaming(&self) -> bool {
        self.active_id.is_some()
    }

    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == message_id)
    }

    fn active_mut(&mut self) -> Option<&mut Message> {
        let active_id = self.active_id.as_deref()?;
        self.messages
            .iter_mut()
            .find(|message| message.id == active_id)
    }

    /// Appends a user prompt and an empty streaming assistant reply.
    pub fn start_turn(&mut self, prompt: &str) -> Result<(String, String), ChatError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ChatError::EmptyPrompt);
        }
        if self.is_streaming() {
            return Err(ChatError::StreamInProgress);
        }

        let user = Message::user(prompt);
        let user_id = user.id.clone();
        self.messages.push(user);
        let assistant_id = self.start_assistant()?;
        Ok((user_id, assistant_id))
    }

    pub fn start_assistant(&mut self) -> Result<String, ChatError> {
        if self.is_streaming() {
            return Err(ChatError::StreamInProgress);
        }
        let assistant = Message::assistant_streaming();
        let assistant_id = assistant.id.clone();
        self.messages.push(assistant);
        self.active_id = Some(assistant_id.clone());
        Ok(assistant_id)
    }

    /// Latest user prompt, used to re-send after a failed reply.
    pub fn last_user_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.as_str())
    }

    /// Re-runs the tag scan over a message's accumulated content.
    pub fn reparse(&mut self, message_id: &str) -> Option<&ParseResult> {
        let message = self
            .messages
            .iter_mut()
            .find(|message| message.id == message_id)?;
        message.reparse();
        Some(&message.parsed)
    }

    /// Inserts an older page at the head, skipping ids already present.
    pub fn prepend(&mut self, older: Vec<Message>) -> usize {
        let known: HashSet<&str> = self.messages.iter().map(|m| m.id.as_str()).collect();
        let mut fresh: Vec<Message> = older
            .into_iter()
            .filter(|message| !known.contains(message.id.as_str()))
            .collect();
        fresh.iter_mut().for_each(restore_persisted);
        let inserted = fresh.len();
        fresh.append(&mut self.messages);
        self.messages = fresh;
        inserted
    }

    /// Freezes the streaming message and clears the active pointer.
    ///
    /// Content gathered so far is always kept. Returns the frozen message, or
    /// `None` when nothing was streaming.
    pub fn finish_active(&mut self, status: MessageStatus, error: Option<String>) -> Option<&Message> {
        let message = self.active_mut()?;
        if !MessageStatus::advance(&mut message.status, status) {
            return None;
        }
        message.error = error;
        message.updated_at = timestamp_millis();
        message.blocks = split_text_blocks(std::mem::take(&mut message.blocks));
        message.reparse();

        let finished_id = self.active_id.take()?;
        self.message(&finished_id)
    }
}

/// Prepares a message read back from disk for display.
fn restore_persisted(message: &mut Message) {
    message.reparse();
    if message.is_streaming() {
        // Interrupted before it finished; keep what arrived.
        message.status = MessageStatus::Complete;
    }
}

fn split_text_blocks(blocks: Vec<ContentBlock>) -> Vec<ContentBlock> {
    let mut out = Vec::with_capacity(blocks.len());
    for block in blocks {
        match block {
            ContentBlock::Text { text } => out.extend(segment_text(&text)),
            other => out.push(other),
        }
    }
    out
}

/// Applies one transport event addressed to `message_id`.
pub fn apply_event(conversation: &mut Conversation, message_id: &str, event: StreamEvent) -> Reduction {
    if conversation.active_id() != Some(message_id) {
        debug!(
            message_id,
            event = event.kind(),
            "dropping event for message that is not streaming"
        );
        return Reduction::Dropped;
    }

    match event {
        StreamEvent::TextDelta { text } => {
            if text.is_empty() {
                return Reduction::Unchanged;
            }
            let Some(message) = conversation.active_mut() else {
                return Reduction::Dropped;
            };
            message.content.push_str(&text);
            match message.blocks.last_mut() {
                Some(ContentBlock::Text { text: last }) => last.push_str(&text),
                _ => message.blocks.push(ContentBlock::Text { text }),
            }
            message.updated_at = timestamp_millis();
            Reduction::ContentChanged
        }
        StreamEvent::ThinkingDelta { text } => {
            let Some(message) = conversation.active_mut() else {
                return Reduction::Dropped;
            };
            if text.is_empty() {
                return Reduction::Unchanged;
            }
            message.thinking.push_str(&text);
            message.updated_at = timestamp_millis();
            Reduction::Updated
        }
        StreamEvent::ToolStart {
            id,
            name,
            arguments,
        } => {
            let Some(message) = conversation.active_mut() else {
                return Reduction::Dropped;
            };
            if message.tool_call(&id).is_some() {
                debug!(tool_id = %id, "ignoring duplicate tool_start");
                return Reduction::Unchanged;
            }
            message.blocks.push(ContentBlock::ToolUse {
                tool_call: ToolCall {
                    id,
                    name,
                    arguments,
                    status: ToolStatus::Running,
                    output: None,
                },
            });
            message.updated_at = timestamp_millis();
            Reduction::Updated
        }
        StreamEvent::ToolEnd { id, result } => {
            let Some(message) = conversation.active_mut() else {
                return Reduction::Dropped;
            };
            let tool_call = message.blocks.iter_mut().find_map(|block| match block {
                ContentBlock::ToolUse { tool_call } if tool_call.id == id => Some(tool_call),
                _ => None,
            });
            let Some(tool_call) = tool_call else {
                debug!(tool_id = %id, "tool_end for unknown tool call");
                return Reduction::Unchanged;
            };
            tool_call.status = if result.success {
                ToolStatus::Completed
            } else {
                ToolStatus::Failed
            };
            tool_call.output = if result.success {
                result.output
            } else {
                result.error.or(result.output)
            };
            message.updated_at = timestamp_millis();
            Reduction::Updated
        }
        StreamEvent::Done { usage } => {
            if let (Some(usage), Some(message)) = (usage, conversation.active_mut()) {
                message.usage = Some(usage);
                return Reduction::Updated;
            }
            Reduction::Unchanged
        }
        StreamEvent::FinalDone { usage } => {
            if let (Some(usage), Some(message)) = (usage, conversation.active_mut()) {
                message.usage = Some(usage);
            }
            match conversation.finish_active(MessageStatus::Complete, None) {
                Some(_) => Reduction::Finished(MessageStatus::Complete),
                None => Reduction::Dropped,
            }
        }
        StreamEvent::Error { message } => {
            match conversation.finish_active(MessageStatus::Error, Some(message)) {
                Some(_) => Reduction::Finished(MessageStatus::Error),
                None => Reduction::Dropped,
            }
        }
    }
}
