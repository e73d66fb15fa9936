use crate::stream::message::{Message, Usage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Events delivered by the streaming transport for one assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    TextDelta {
        text: String,
    },
    ThinkingDelta {
        text: String,
    },
    ToolStart {
        id: String,
        name: String,
        #[serde(default)]
        arguments: Value,
    },
    ToolEnd {
        id: String,
        result: ToolResult,
    },
    /// One model round-trip finished; a tool loop may still continue.
    Done {
        #[serde(default)]
        usage: Option<Usage>,
    },
    FinalDone {
        #[serde(default)]
        usage: Option<Usage>,
    },
    Error {
        message: String,
    },
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TextDelta { .. } => "text_delta",
            Self::ThinkingDelta { .. } => "thinking_delta",
            Self::ToolStart { .. } => "tool_start",
            Self::ToolEnd { .. } => "tool_end",
            Self::Done { .. } => "done",
            Self::FinalDone { .. } => "final_done",
            Self::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub enum AppEvent {
    Stream {
        message_id: String,
        event: StreamEvent,
    },
    CancelAcknowledged {
        message_id: String,
    },
    CancelTimedOut {
        message_id: String,
    },
    /// Older persisted messages for `session_id`, starting at index `start`.
    HistoryPage {
        session_id: String,
        messages: Vec<Message>,
        start: usize,
        has_more: bool,
    },
    HistoryFailed {
        session_id: String,
        error: String,
    },
    /// The connection carrying `message_id` dropped before the stream finished.
    TransportError {
        message_id: String,
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::{StreamEvent, ToolResult};
    use serde_json::json;

    #[test]
    fn stream_events_use_snake_case_type_tags() {
        let event: StreamEvent = serde_json::from_value(json!({
            "type": "tool_end",
            "id": "call-1",
            "result": { "success": false, "error": "denied" }
        }))
        .expect("tool_end payload should deserialize");

        assert_eq!(
            event,
            StreamEvent::ToolEnd {
                id: "call-1".to_string(),
                result: ToolResult {
                    success: false,
                    output: None,
                    error: Some("denied".to_string()),
                },
            }
        );
        assert_eq!(event.kind(), "tool_end");
    }

    #[test]
    fn final_done_usage_is_optional() {
        let event: StreamEvent = serde_json::from_value(json!({ "type": "final_done" }))
            .expect("final_done without usage should deserialize");
        assert_eq!(event, StreamEvent::FinalDone { usage: None });
    }
}
