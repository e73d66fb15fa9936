use crate::stream::tag_parser::ParseResult;

/// Receiver of chat-extracted documents. Called at streaming frequency.
pub trait CanvasSink {
    fn on_canvas_update(&mut self, path: &str, content: &str, is_complete: bool);
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ForwardKey {
    path: String,
    content_len: usize,
    is_complete: bool,
}

/// Forwards the first tagged block of each scan to the canvas, skipping scans
/// whose `(path, content length, completeness)` matches the last one sent.
#[derive(Debug, Default)]
pub struct CanvasUpdateBridge {
    last_key: Option<ForwardKey>,
}

impl CanvasUpdateBridge {
    /// Returns whether the sink was called.
    pub fn observe(&mut self, parsed: &ParseResult, sink: &mut dyn CanvasSink) -> bool {
        let Some(block) = parsed.first_block() else {
            return false;
        };

        let key = ForwardKey {
            path: block.path.clone(),
            content_len: block.content.len(),
            is_complete: block.is_complete,
        };
        if self.last_key.as_ref() == Some(&key) {
            return false;
        }

        sink.on_canvas_update(&block.path, &block.content, block.is_complete);
        self.last_key = Some(key);
        true
    }

    pub fn reset(&mut self) {
        self.last_key = None;
    }
}
