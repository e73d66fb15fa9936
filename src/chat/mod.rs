//! One conversation: its streaming turn, list model, canvas and history.
//!
//! At most one assistant message streams at a time. Every way a stream ends
//! (final event, error, stop, failed start) goes through `release_stream`.

use crate::canvas::bridge::CanvasSink;
use crate::canvas::workspace::CanvasWorkspaceState;
use crate::config::{ChatSettings, Settings};
use crate::error::ChatError;
use crate::event::{AppEvent, StreamEvent};
use crate::list::{Growth, PaginationState, ScrollCommand, VirtualizedMessageList};
use crate::session::store::SessionStore;
use crate::session::{HistoryPage, SessionMeta};
use crate::stream::message::{Message, MessageStatus};
use crate::stream::pipeline::StreamPipeline;
use crate::stream::reducer::{Conversation, Reduction};
use crate::transport::{ChatBackend, EventSink, StreamRequest, StreamSubscription};
use crate::workflow::StepTracker;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default)]
struct HistoryCursor {
    /// Persisted index of the oldest message already shown.
    next_end: usize,
    has_more: bool,
    is_loading: bool,
}

pub struct ChatSession {
    conversation: Conversation,
    pipeline: StreamPipeline,
    list: VirtualizedMessageList,
    pending_scroll: ScrollCommand,
    canvas: CanvasWorkspaceState,
    steps: StepTracker,
    backend: Arc<dyn ChatBackend>,
    runtime: Handle,
    tx: EventSink,
    subscription: Option<StreamSubscription>,
    store: SessionStore,
    meta: SessionMeta,
    history: HistoryCursor,
    settings: ChatSettings,
    notices: Vec<String>,
}

impl ChatSession {
    /// Opens `meta` showing only its newest page of messages.
    pub fn open(
        meta: SessionMeta,
        store: SessionStore,
        backend: Arc<dyn ChatBackend>,
        runtime: Handle,
        tx: EventSink,
        settings: &Settings,
    ) -> Self {
        let page = HistoryPage::slice(
            &meta.messages,
            meta.messages.len(),
            settings.chat.history_page_size,
        );
        let history = HistoryCursor {
            next_end: page.start,
            has_more: page.has_more,
            is_loading: false,
        };

        let mut session = Self {
            conversation: Conversation::from_messages(page.messages),
            pipeline: StreamPipeline::new(),
            list: VirtualizedMessageList::new(settings.list),
            pending_scroll: ScrollCommand::None,
            canvas: meta.canvas_workspace.clone(),
            steps: StepTracker::new(),
            backend,
            runtime,
            tx,
            subscription: None,
            store,
            meta,
            history,
            settings: settings.chat.clone(),
            notices: Vec::new(),
        };
        session.sync_list(Growth::Organic);
        session
    }

    pub fn session_id(&self) -> &str {
        &self.meta.session_id
    }

    pub fn meta(&self) -> &SessionMeta {
        &self.meta
    }

    pub fn is_streaming(&self) -> bool {
        self.conversation.is_streaming()
    }

    pub fn canvas_mut(&mut self) -> &mut CanvasWorkspaceState {
        &mut self.canvas
    }

    pub fn steps(&self) -> &StepTracker {
        &self.steps
    }

    pub fn pagination_state(&self) -> PaginationState {
        PaginationState {
            has_more: self.history.has_more,
            is_loading_more: self.history.is_loading,
        }
    }

    /// The pieces the list view needs at once.
    pub fn list_parts(&mut self) -> (&mut VirtualizedMessageList, &[Message], &mut ScrollCommand) {
        (
            &mut self.list,
            self.conversation.messages(),
            &mut self.pending_scroll,
        )
    }

    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    pub fn send(&mut self, prompt: &str) -> Result<(), ChatError> {
        let (user_id, assistant_id) = self.conversation.start_turn(prompt)?;
        self.meta.title_from_prompt(prompt);
        if let Some(user) = self.conversation.message(&user_id).cloned() {
            self.persist(user);
        }
        self.begin_stream(assistant_id, prompt.trim().to_string())
    }

    /// Re-sends the latest user prompt as a fresh assistant reply.
    pub fn retry(&mut self) -> Result<(), ChatError> {
        if self.is_streaming() {
            return Err(ChatError::StreamInProgress);
        }
        let prompt = self
            .conversation
            .last_user_prompt()
            .ok_or(ChatError::NothingToRetry)?
            .to_string();
        let assistant_id = self.conversation.start_assistant()?;
        info!(message_id = %assistant_id, "retrying last prompt");
        self.begin_stream(assistant_id, prompt)
    }

    fn begin_stream(&mut self, message_id: String, prompt: String) -> Result<(), ChatError> {
        self.pipeline.begin_message();
        self.steps.clear();
        self.sync_list(Growth::Organic);

        let request = StreamRequest {
            message_id: message_id.clone(),
            prompt,
        };
        match self.backend.start_stream(request, self.tx.clone()) {
            Ok(subscription) => {
                info!(message_id = %message_id, "stream started");
                self.subscription = Some(subscription);
                Ok(())
            }
            Err(err) => {
                warn!(message_id = %message_id, "failed to start stream: {err}");
                self.conversation
                    .finish_active(MessageStatus::Error, Some(err.to_string()));
                self.release_stream(&message_id);
                Err(err.into())
            }
        }
    }

    /// Halts the streaming reply, keeping what arrived. No-op when idle.
    pub fn stop(&mut self) -> bool {
        let Some(message_id) = self.conversation.active_id().map(str::to_string) else {
            return false;
        };

        let ack = self.backend.cancel(&message_id);
        let timeout = self.settings.cancel_timeout();
        let tx = self.tx.clone();
        let ack_id = message_id.clone();
        self.runtime.spawn(async move {
            let event = match tokio::time::timeout(timeout, ack).await {
                Ok(Ok(())) => AppEvent::CancelAcknowledged { message_id: ack_id },
                Ok(Err(_)) | Err(_) => AppEvent::CancelTimedOut { message_id: ack_id },
            };
            let _ = tx.send(event);
        });

        self.conversation.finish_active(MessageStatus::Complete, None);
        if let Some(message) = self.conversation.message(&message_id) {
            self.pipeline.settle(&message.parsed, &mut self.canvas);
        }
        info!(message_id = %message_id, "stream stopped by user");
        self.release_stream(&message_id);
        true
    }

    /// Single exit for a stream: drops the subscription and persists the reply.
    fn release_stream(&mut self, message_id: &str) {
        if let Some(subscription) = self.subscription.take() {
            debug!(message_id = subscription.message_id(), "releasing subscription");
        }
        let skipped = self.steps.skip_unfinished();
        if skipped > 0 {
            debug!(message_id, skipped, "skipped unfinished tool steps");
        }
        self.pipeline.begin_message();

        if let Some(message) = self.conversation.message(message_id).cloned() {
            self.persist(message);
        }
        self.sync_list(Growth::Organic);
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Stream { message_id, event } => self.handle_stream_event(&message_id, event),
            AppEvent::CancelAcknowledged { message_id } => {
                info!(message_id = %message_id, "backend acknowledged stop");
            }
            AppEvent::CancelTimedOut { message_id } => {
                warn!(message_id = %message_id, "backend did not acknowledge stop in time");
                self.notices
                    .push("Backend did not confirm the stop request".to_string());
            }
            AppEvent::HistoryPage {
                session_id,
                messages,
                start,
                has_more,
            } => {
                if session_id != self.meta.session_id {
                    debug!(session_id = %session_id, "ignoring history page for other session");
                    return;
                }
                let inserted = self.conversation.prepend(messages);
                self.history = HistoryCursor {
                    next_end: start,
                    has_more,
                    is_loading: false,
                };
                debug!(inserted, start, has_more, "prepended history page");
                self.sync_list(Growth::Organic);
                self.list.finish_load_more();
            }
            AppEvent::HistoryFailed { session_id, error } => {
                if session_id != self.meta.session_id {
                    return;
                }
                warn!("failed to load older messages: {error}");
                self.history.is_loading = false;
                self.list.finish_load_more();
                self.notices
                    .push(format!("Failed to load older messages: {error}"));
            }
            AppEvent::TransportError { message_id, error } => {
                if self.conversation.active_id() != Some(message_id.as_str()) {
                    debug!(message_id = %message_id, "ignoring transport error for inactive stream");
                    return;
                }
                warn!(message_id = %message_id, "transport error: {error}");
                self.conversation
                    .finish_active(MessageStatus::Error, Some(error));
                self.release_stream(&message_id);
            }
        }
    }

    fn handle_stream_event(&mut self, message_id: &str, event: StreamEvent) {
        if self.conversation.active_id() == Some(message_id) {
            self.track_tool_step(&event);
        }

        let outcome = self
            .pipeline
            .process(&mut self.conversation, message_id, event, &mut self.canvas);
        match outcome.reduction {
            Reduction::Dropped | Reduction::Unchanged => {}
            Reduction::ContentChanged | Reduction::Updated => self.sync_list(Growth::Streaming),
            Reduction::Finished(status) => {
                info!(message_id, ?status, "stream finished");
                self.release_stream(message_id);
            }
        }
    }

    fn track_tool_step(&mut self, event: &StreamEvent) {
        let result = match event {
            StreamEvent::ToolStart { id, name, .. } => self
                .steps
                .push(id.clone(), name.clone())
                .and_then(|()| self.steps.activate(id)),
            StreamEvent::ToolEnd { id, result } if result.success => {
                self.steps.complete(id, result.output.clone())
            }
            StreamEvent::ToolEnd { id, result } => {
                let error = result.error.clone().unwrap_or_else(|| "tool failed".to_string());
                self.steps.fail(id, error)
            }
            _ => Ok(()),
        };
        if let Err(err) = result {
            debug!("tool step not tracked: {err}");
        }
    }

    /// Asks the store for the page before the oldest shown message.
    pub fn request_older_page(&mut self) -> bool {
        if !self.history.has_more || self.history.is_loading {
            return false;
        }
        self.history.is_loading = true;

        let store = self.store.clone();
        let session_id = self.meta.session_id.clone();
        let end = self.history.next_end;
        let limit = self.settings.history_page_size;
        let tx = self.tx.clone();
        self.runtime.spawn_blocking(move || {
            let event = match store.load_page(&session_id, end, limit) {
                Ok(page) => AppEvent::HistoryPage {
                    session_id,
                    messages: page.messages,
                    start: page.start,
                    has_more: page.has_more,
                },
                Err(err) => AppEvent::HistoryFailed {
                    session_id,
                    error: err.to_string(),
                },
            };
            let _ = tx.send(event);
        });
        true
    }

    /// Shows a tagged file from `message_id` in the canvas.
    pub fn open_in_canvas(&mut self, message_id: &str, path: &str) {
        if self.canvas.document(path).is_none() {
            let block = self
                .conversation
                .message(message_id)
                .and_then(|message| message.parsed.blocks.iter().find(|b| b.path == path))
                .cloned();
            if let Some(block) = block {
                self.canvas
                    .on_canvas_update(&block.path, &block.content, block.is_complete);
            }
        }
        self.canvas.focus(path);
    }

    fn persist(&mut self, message: Message) {
        match self
            .meta
            .messages
            .iter_mut()
            .find(|persisted| persisted.id == message.id)
        {
            Some(existing) => *existing = message,
            None => self.meta.messages.push(message),
        }
        self.save();
    }

    pub fn save(&mut self) {
        self.meta.canvas_workspace = self.canvas.clone();
        if let Err(err) = self.store.save(&self.meta) {
            warn!(session_id = %self.meta.session_id, "failed to save session: {err}");
            self.notices.push(format!("Failed to save session: {err}"));
        }
    }

    fn sync_list(&mut self, growth: Growth) {
        let ids = self.conversation.messages().iter().map(|message| message.id.as_str());
        let command = self.list.sync(ids, growth);
        if command != ScrollCommand::None {
            self.pending_scroll = command;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ChatSession;
    use crate::canvas::workspace::CanvasWorkspaceState;
    use crate::config::Settings;
    use crate::error::{ChatError, TransportError};
    use crate::event::{AppEvent, StreamEvent, ToolResult};
    use crate::session::store::SessionStore;
    use crate::session::SessionMeta;
    use crate::stream::message::{Message, MessageStatus, Role};
    use crate::transport::{ChatBackend, EventSink, StreamRequest, StreamSubscription};
    use crate::workflow::StepStatus;
    use std::sync::{mpsc, Arc, Mutex};
    use std::time::Duration;
    use tokio::runtime::Handle;
    use tokio::sync::oneshot;

    impl ChatSession {
        fn messages(&self) -> &[Message] {
            self.conversation.messages()
        }

        fn has_subscription(&self) -> bool {
            self.subscription.is_some()
        }

        fn canvas(&self) -> &CanvasWorkspaceState {
            &self.canvas
        }
    }

    /// Emits its whole script synchronously when a stream starts.
    #[derive(Default)]
    struct ScriptedBackend {
        script: Vec<StreamEvent>,
        fail_start: bool,
        drop_connection: bool,
        hold_acks: bool,
        prompts: Mutex<Vec<String>>,
        held: Mutex<Vec<oneshot::Sender<()>>>,
    }

    impl ScriptedBackend {
        fn with_script(script: Vec<StreamEvent>) -> Self {
            Self {
                script,
                ..Self::default()
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().expect("prompts lock").clone()
        }
    }

    impl ChatBackend for ScriptedBackend {
        fn start_stream(
            &self,
            request: StreamRequest,
            sink: EventSink,
        ) -> Result<StreamSubscription, TransportError> {
            if self.fail_start {
                return Err(TransportError::Unavailable("offline".to_string()));
            }
            self.prompts
                .lock()
                .expect("prompts lock")
                .push(request.prompt.clone());
            for event in &self.script {
                sink.send(AppEvent::Stream {
                    message_id: request.message_id.clone(),
                    event: event.clone(),
                })
                .expect("test receiver should be alive");
            }
            if self.drop_connection {
                sink.send(AppEvent::TransportError {
                    message_id: request.message_id.clone(),
                    error: "connection reset".to_string(),
                })
                .expect("test receiver should be alive");
            }
            Ok(StreamSubscription::detached(request.message_id))
        }

        fn cancel(&self, _message_id: &str) -> oneshot::Receiver<()> {
            let (ack_tx, ack_rx) = oneshot::channel();
            if self.hold_acks {
                self.held.lock().expect("held lock").push(ack_tx);
            } else {
                let _ = ack_tx.send(());
            }
            ack_rx
        }
    }

    fn text(text: &str) -> StreamEvent {
        StreamEvent::TextDelta {
            text: text.to_string(),
        }
    }

    struct Harness {
        session: ChatSession,
        rx: mpsc::Receiver<AppEvent>,
        store: SessionStore,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        fn new(backend: Arc<ScriptedBackend>, meta: SessionMeta, settings: Settings) -> Self {
            let dir = tempfile::tempdir().expect("temp dir should be created");
            let store = SessionStore::new(dir.path());
            store.save(&meta).expect("seed session should save");
            let (tx, rx) = mpsc::channel();
            let session = ChatSession::open(
                meta,
                store.clone(),
                backend,
                Handle::current(),
                tx,
                &settings,
            );
            Self {
                session,
                rx,
                store,
                _dir: dir,
            }
        }

        fn fresh(backend: Arc<ScriptedBackend>) -> Self {
            Self::new(
                backend,
                SessionMeta::new("chat-test".to_string(), 1),
                Settings::default(),
            )
        }

        /// Feeds every queued event back into the session.
        fn drain(&mut self) {
            while let Ok(event) = self.rx.try_recv() {
                self.session.handle_event(event);
            }
        }

        fn last(&self) -> &Message {
            self.session.messages().last().expect("a message should exist")
        }
    }

    #[tokio::test]
    async fn send_streams_to_completion_and_persists_turn() {
        let backend = Arc::new(ScriptedBackend::with_script(vec![
            StreamEvent::ThinkingDelta {
                text: "pondering".to_string(),
            },
            text("Hello"),
            text(" world"),
            StreamEvent::Done { usage: None },
            StreamEvent::FinalDone { usage: None },
        ]));
        let mut harness = Harness::fresh(Arc::clone(&backend));

        harness.session.send("  hi  ").expect("send should start a stream");
        assert!(harness.session.is_streaming());
        harness.drain();

        assert!(!harness.session.is_streaming());
        assert!(!harness.session.has_subscription());
        let reply = harness.last();
        assert_eq!(reply.status, MessageStatus::Complete);
        assert_eq!(reply.content, "Hello world");
        assert_eq!(reply.thinking, "pondering");
        assert_eq!(backend.prompts(), vec!["hi".to_string()]);

        let saved = harness.store.load_one("chat-test").expect("session should load");
        assert_eq!(saved.messages.len(), 2);
        assert_eq!(saved.messages[0].role, Role::User);
        assert_eq!(saved.messages[1].status, MessageStatus::Complete);
        assert_eq!(saved.title.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn second_send_while_streaming_is_rejected() {
        let backend = Arc::new(ScriptedBackend::with_script(vec![text("partial")]));
        let mut harness = Harness::fresh(backend);

        harness.session.send("first").expect("first send should start");
        let error = harness
            .session
            .send("second")
            .expect_err("second send must be rejected");
        assert!(matches!(error, ChatError::StreamInProgress));
        assert!(matches!(harness.session.retry(), Err(ChatError::StreamInProgress)));
        assert_eq!(harness.session.messages().len(), 2);
    }

    #[tokio::test]
    async fn stop_keeps_partial_content_and_is_idempotent() {
        let backend = Arc::new(ScriptedBackend::with_script(vec![text("half an ans")]));
        let mut harness = Harness::fresh(backend);

        harness.session.send("question").expect("send should start");
        harness.drain();
        let reply_id = harness.last().id.clone();

        assert!(harness.session.stop());
        assert!(!harness.session.stop());
        assert!(!harness.session.is_streaming());
        assert!(!harness.session.has_subscription());
        assert_eq!(harness.last().status, MessageStatus::Complete);
        assert_eq!(harness.last().content, "half an ans");

        harness.session.handle_event(AppEvent::Stream {
            message_id: reply_id,
            event: text("wer"),
        });
        assert_eq!(harness.last().content, "half an ans");

        harness.session.send("next").expect("a new turn can start after stop");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unacknowledged_stop_times_out() {
        let backend = Arc::new(ScriptedBackend {
            script: vec![text("slow")],
            hold_acks: true,
            ..ScriptedBackend::default()
        });
        let mut settings = Settings::default();
        settings.chat.cancel_timeout_ms = 20;
        let mut harness = Harness::new(
            backend,
            SessionMeta::new("timeout".to_string(), 1),
            settings,
        );

        harness.session.send("go").expect("send should start");
        harness.drain();
        assert!(harness.session.stop());

        let event = harness
            .rx
            .recv_timeout(Duration::from_secs(2))
            .expect("timeout event should arrive");
        assert!(matches!(event, AppEvent::CancelTimedOut { .. }));
        harness.session.handle_event(event);
        assert_eq!(harness.session.take_notices().len(), 1);
    }

    #[tokio::test]
    async fn error_keeps_partial_output_and_retry_resends_prompt() {
        let backend = Arc::new(ScriptedBackend::with_script(vec![
            text("so far"),
            StreamEvent::Error {
                message: "rate limited".to_string(),
            },
        ]));
        let mut harness = Harness::fresh(Arc::clone(&backend));

        harness.session.send("try me").expect("send should start");
        harness.drain();
        let failed = harness.last();
        assert_eq!(failed.status, MessageStatus::Error);
        assert_eq!(failed.content, "so far");
        assert_eq!(failed.error.as_deref(), Some("rate limited"));
        assert!(!harness.session.has_subscription());

        harness.session.retry().expect("retry should start a stream");
        assert_eq!(harness.session.messages().len(), 3);
        assert_eq!(backend.prompts(), vec!["try me".to_string(), "try me".to_string()]);
    }

    #[tokio::test]
    async fn retry_without_prompt_is_rejected() {
        let mut harness = Harness::fresh(Arc::new(ScriptedBackend::default()));
        assert!(matches!(harness.session.retry(), Err(ChatError::NothingToRetry)));
    }

    #[tokio::test]
    async fn failed_start_marks_reply_as_error() {
        let backend = Arc::new(ScriptedBackend {
            fail_start: true,
            ..ScriptedBackend::default()
        });
        let mut harness = Harness::fresh(backend);

        let error = harness.session.send("hello").expect_err("start should fail");
        assert!(matches!(error, ChatError::Transport(_)));
        assert!(!harness.session.is_streaming());
        assert_eq!(harness.last().status, MessageStatus::Error);
    }

    #[tokio::test]
    async fn dropped_connection_fails_the_reply_and_allows_retry() {
        let backend = Arc::new(ScriptedBackend {
            script: vec![text("Half an ans")],
            drop_connection: true,
            ..ScriptedBackend::default()
        });
        let mut harness = Harness::fresh(Arc::clone(&backend));

        harness.session.send("explain").expect("send should start a stream");
        harness.drain();

        assert!(!harness.session.is_streaming());
        assert!(!harness.session.has_subscription());
        let reply = harness.last();
        assert_eq!(reply.status, MessageStatus::Error);
        assert_eq!(reply.content, "Half an ans");
        assert_eq!(reply.error.as_deref(), Some("connection reset"));

        let saved = harness.store.load_one("chat-test").expect("session should load");
        assert_eq!(saved.messages[1].status, MessageStatus::Error);

        harness.session.retry().expect("retry should start a new stream");
        assert_eq!(backend.prompts(), vec!["explain".to_string(), "explain".to_string()]);
    }

    #[tokio::test]
    async fn transport_error_for_inactive_stream_is_ignored() {
        let backend = Arc::new(ScriptedBackend::with_script(vec![text("partial")]));
        let mut harness = Harness::fresh(backend);
        harness.session.send("hello").expect("send should start a stream");
        harness.drain();

        harness.session.handle_event(AppEvent::TransportError {
            message_id: "stale".to_string(),
            error: "connection reset".to_string(),
        });
        assert!(harness.session.is_streaming());
        assert_eq!(harness.last().status, MessageStatus::Streaming);
    }

    #[tokio::test]
    async fn write_file_block_and_tool_steps_are_tracked() {
        let backend = Arc::new(ScriptedBackend::with_script(vec![
            StreamEvent::ToolStart {
                id: "t1".to_string(),
                name: "draft_document".to_string(),
                arguments: serde_json::json!({}),
            },
            StreamEvent::ToolEnd {
                id: "t1".to_string(),
                result: ToolResult {
                    success: true,
                    output: Some("ok".to_string()),
                    error: None,
                },
            },
            StreamEvent::ToolStart {
                id: "t2".to_string(),
                name: "lookup".to_string(),
                arguments: serde_json::json!({}),
            },
            text("<write_file path=\"story.md\">Once"),
            text(" upon</write_file>"),
            StreamEvent::FinalDone { usage: None },
        ]));
        let mut harness = Harness::fresh(backend);

        harness.session.send("write a story").expect("send should start");
        harness.drain();

        let document = harness
            .session
            .canvas()
            .document("story.md")
            .expect("canvas document should open");
        assert_eq!(document.content, "Once upon");
        assert!(document.is_complete);

        let statuses: Vec<_> = harness
            .session
            .steps()
            .steps()
            .iter()
            .map(|step| step.status)
            .collect();
        assert_eq!(statuses, vec![StepStatus::Completed, StepStatus::Skipped]);

        let saved = harness.store.load_one("chat-test").expect("session should load");
        assert!(saved.canvas_workspace.document("story.md").is_some());
    }

    #[tokio::test]
    async fn open_in_canvas_restores_document_from_message() {
        let mut meta = SessionMeta::new("restore".to_string(), 1);
        let mut reply = Message::user("<write_file path=\"a.md\">alpha</write_file>");
        reply.role = Role::Assistant;
        let reply_id = reply.id.clone();
        meta.messages.push(reply);
        let mut harness = Harness::new(
            Arc::new(ScriptedBackend::default()),
            meta,
            Settings::default(),
        );

        harness.session.open_in_canvas(&reply_id, "a.md");
        let active = harness
            .session
            .canvas()
            .active_document()
            .expect("document should be active");
        assert_eq!(active.path, "a.md");
        assert_eq!(active.content, "alpha");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn older_pages_are_loaded_once_at_a_time_and_prepended() {
        let mut meta = SessionMeta::new("history".to_string(), 1);
        for index in 0..5 {
            meta.messages.push(Message::user(format!("m{index}")));
        }
        let mut settings = Settings::default();
        settings.chat.history_page_size = 2;
        let mut harness = Harness::new(Arc::new(ScriptedBackend::default()), meta, settings);

        let shown: Vec<_> = harness.session.messages().iter().map(|m| m.content.clone()).collect();
        assert_eq!(shown, vec!["m3", "m4"]);
        assert!(harness.session.pagination_state().has_more);

        assert!(harness.session.request_older_page());
        assert!(!harness.session.request_older_page());
        assert!(harness.session.pagination_state().is_loading_more);

        let event = harness
            .rx
            .recv_timeout(Duration::from_secs(2))
            .expect("history page should arrive");
        harness.session.handle_event(event);

        let shown: Vec<_> = harness.session.messages().iter().map(|m| m.content.clone()).collect();
        assert_eq!(shown, vec!["m1", "m2", "m3", "m4"]);
        let pager = harness.session.pagination_state();
        assert!(pager.has_more);
        assert!(!pager.is_loading_more);

        assert!(harness.session.request_older_page());
        let event = harness
            .rx
            .recv_timeout(Duration::from_secs(2))
            .expect("history page should arrive");
        harness.session.handle_event(event);
        assert_eq!(harness.session.messages().len(), 5);
        assert!(!harness.session.pagination_state().has_more);
        assert!(!harness.session.request_older_page());
    }

    #[tokio::test]
    async fn history_for_another_session_is_ignored() {
        let mut harness = Harness::fresh(Arc::new(ScriptedBackend::default()));
        harness.session.handle_event(AppEvent::HistoryPage {
            session_id: "someone-else".to_string(),
            messages: vec![Message::user("stray")],
            start: 0,
            has_more: false,
        });
        assert!(harness.session.messages().is_empty());
    }
}
