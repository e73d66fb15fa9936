//! Reducer → tag scan → canvas bridge, as explicit stages.
//!
//! The reducer reports `ContentChanged` when the accumulated text grew; only
//! then does the scan stage run, and only a changed scan reaches the bridge.

use crate::canvas::bridge::{CanvasSink, CanvasUpdateBridge};
use crate::event::StreamEvent;
use crate::stream::reducer::{apply_event, Conversation, Reduction};
use crate::stream::tag_parser::ParseResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub reduction: Reduction,
    pub blocks_changed: bool,
    pub canvas_forwarded: bool,
}

#[derive(Debug, Default)]
pub struct StreamPipeline {
    bridge: CanvasUpdateBridge,
}

impl StreamPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh de-dup window for a new streaming message.
    pub fn begin_message(&mut self) {
        self.bridge.reset();
    }

    /// Forwards the final scan of a message frozen outside the event path.
    pub fn settle(&mut self, parsed: &ParseResult, canvas: &mut dyn CanvasSink) -> bool {
        self.bridge.observe(parsed, canvas)
    }

    pub fn process(
        &mut self,
        conversation: &mut Conversation,
        message_id: &str,
        event: StreamEvent,
        canvas: &mut dyn CanvasSink,
    ) -> PipelineOutcome {
        let reduction = apply_event(conversation, message_id, event);
        let mut outcome = PipelineOutcome {
            reduction,
            blocks_changed: false,
            canvas_forwarded: false,
        };

        match reduction {
            Reduction::ContentChanged => {
                let previous = conversation
                    .message(message_id)
                    .map(|message| message.parsed.blocks.clone())
                    .unwrap_or_default();
                let Some(parsed) = conversation.reparse(message_id) else {
                    return outcome;
                };
                outcome.blocks_changed = parsed.blocks != previous;
                if outcome.blocks_changed {
                    outcome.canvas_forwarded = self.bridge.observe(parsed, canvas);
                }
            }
            Reduction::Finished(_) => {
                // The final scan already ran inside `finish_active`.
                if let Some(message) = conversation.message(message_id) {
                    outcome.canvas_forwarded = self.bridge.observe(&message.parsed, canvas);
                }
            }
            Reduction::Dropped | Reduction::Unchanged | Reduction::Updated => {}
        }

        outcome
    }
}
