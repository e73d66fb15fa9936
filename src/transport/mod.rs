//! Streaming backends and the subscription handle a running stream hands back.

use crate::error::TransportError;
use crate::event::{AppEvent, StreamEvent, ToolResult};
use crate::stream::message::Usage;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub type EventSink = mpsc::Sender<AppEvent>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub message_id: String,
    pub prompt: String,
}

pub trait ChatBackend: Send + Sync {
    /// Starts streaming a reply for `request`; events go to `sink` in order.
    fn start_stream(
        &self,
        request: StreamRequest,
        sink: EventSink,
    ) -> Result<StreamSubscription, TransportError>;

    /// Asks the backend to halt the stream. The receiver resolves on acknowledgement.
    fn cancel(&self, message_id: &str) -> oneshot::Receiver<()>;
}

/// Owned handle to one in-flight stream. Dropping it stops event delivery.
#[derive(Debug)]
pub struct StreamSubscription {
    message_id: String,
    task: Option<JoinHandle<()>>,
}

impl StreamSubscription {
    pub fn new(message_id: impl Into<String>, task: JoinHandle<()>) -> Self {
        Self {
            message_id: message_id.into(),
            task: Some(task),
        }
    }

    /// A subscription with no task behind it.
    #[cfg(test)]
    pub fn detached(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            task: None,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }
}

impl Drop for StreamSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                task.abort();
            }
            debug!(message_id = %self.message_id, "stream subscription released");
        }
    }
}

/// Local backend that replays a scripted reply derived from the prompt.
///
/// Prompts mentioning "offline" fail to start, and prompts mentioning
/// "disconnect" lose the connection halfway through the reply.
pub struct EchoBackend {
    runtime: Handle,
    delay: Duration,
    active: Arc<Mutex<HashMap<String, Arc<AtomicBool>>>>,
}

impl EchoBackend {
    pub fn new(runtime: Handle, delay: Duration) -> Self {
        Self {
            runtime,
            delay,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn active(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<AtomicBool>>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ChatBackend for EchoBackend {
    fn start_stream(
        &self,
        request: StreamRequest,
        sink: EventSink,
    ) -> Result<StreamSubscription, TransportError> {
        let lowered = request.prompt.to_lowercase();
        if lowered.contains("offline") {
            return Err(TransportError::Unavailable(
                "echo backend is offline".to_string(),
            ));
        }
        if self.active().contains_key(&request.message_id) {
            return Err(TransportError::Rejected(format!(
                "stream {} is already running",
                request.message_id
            )));
        }

        let mut script = echo_script(&request.prompt);
        let drops_connection = lowered.contains("disconnect");
        if drops_connection {
            script.truncate(script.len() / 2);
        }
        let cancelled = Arc::new(AtomicBool::new(false));
        self.active()
            .insert(request.message_id.clone(), Arc::clone(&cancelled));

        let active = Arc::clone(&self.active);
        let delay = self.delay;
        let message_id = request.message_id.clone();
        info!(message_id = %message_id, events = script.len(), "echo stream started");

        let task = self.runtime.spawn(async move {
            let mut delivered = true;
            for event in script {
                tokio::time::sleep(delay).await;
                if cancelled.load(Ordering::SeqCst) {
                    delivered = false;
                    break;
                }
                let envelope = AppEvent::Stream {
                    message_id: message_id.clone(),
                    event,
                };
                if sink.send(envelope).is_err() {
                    delivered = false;
                    break;
                }
            }
            if delivered && drops_connection {
                warn!(message_id = %message_id, "echo connection dropped");
                let _ = sink.send(AppEvent::TransportError {
                    message_id: message_id.clone(),
                    error: "connection to echo backend lost".to_string(),
                });
            }
            active
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&message_id);
        });

        Ok(StreamSubscription::new(request.message_id, task))
    }

    fn cancel(&self, message_id: &str) -> oneshot::Receiver<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        let flag = self.active().remove(message_id);
        match flag {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                let delay = self.delay;
                self.runtime.spawn(async move {
                    // The stream task observes the flag after its current sleep.
                    tokio::time::sleep(delay).await;
                    let _ = ack_tx.send(());
                });
            }
            None => {
                let _ = ack_tx.send(());
            }
        }
        ack_rx
    }
}

/// The events the echo backend emits for `prompt`.
pub fn echo_script(prompt: &str) -> Vec<StreamEvent> {
    let prompt = prompt.trim();
    let lowered = prompt.to_lowercase();
    let mut events = vec![StreamEvent::ThinkingDelta {
        text: format!("Reading the request ({} chars).", prompt.chars().count()),
    }];

    let mut reply = format!("You said: {prompt}\n\n");
    if lowered.contains("fail") {
        events.extend(text_chunks(&reply));
        events.push(StreamEvent::Error {
            message: "echo backend was asked to fail".to_string(),
        });
        return events;
    }

    if lowered.contains("write") || lowered.contains("draft") {
        let path = "draft.md";
        events.push(StreamEvent::ToolStart {
            id: "echo-draft".to_string(),
            name: "draft_document".to_string(),
            arguments: json!({ "path": path }),
        });
        events.push(StreamEvent::ToolEnd {
            id: "echo-draft".to_string(),
            result: ToolResult {
                success: true,
                output: Some(format!("opened {path}")),
                error: None,
            },
        });
        events.push(StreamEvent::Done { usage: None });
        reply.push_str(&format!(
            "Here is a draft.\n<write_file path=\"{path}\"># Draft\n\n{prompt}\n</write_file>\nDone."
        ));
    } else {
        reply.push_str("```text\n");
        reply.push_str(prompt);
        reply.push_str("\n```\n");
    }

    events.extend(text_chunks(&reply));
    let output_tokens = reply.split_whitespace().count() as u64;
    events.push(StreamEvent::Done { usage: None });
    events.push(StreamEvent::FinalDone {
        usage: Some(Usage {
            input_tokens: prompt.split_whitespace().count() as u64,
            output_tokens,
        }),
    });
    events
}

fn text_chunks(text: &str) -> Vec<StreamEvent> {
    const CHUNK_CHARS: usize = 12;
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(CHUNK_CHARS)
        .map(|chunk| StreamEvent::TextDelta {
            text: chunk.iter().collect(),
        })
        .collect()
}
