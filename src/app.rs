use crate::canvas::workspace::CanvasActor;
use crate::chat::ChatSession;
use crate::config::Settings;
use crate::event::AppEvent;
use crate::lifecycle::Lifecycle;
use crate::list::view::{show_message_list, MessageAction};
use crate::session::store::SessionStore;
use crate::session::SessionMeta;
use crate::stream::message::{timestamp_millis, Message};
use crate::theme::Theme;
use crate::transport::{ChatBackend, EventSink};
use eframe::egui::{self, RichText, ScrollArea};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::runtime::Handle;
use tracing::{info, warn};

const DIAGNOSTICS_LIMIT: usize = 500;

pub struct ScribeApp {
    rx: Receiver<AppEvent>,
    tx: EventSink,
    backend: Arc<dyn ChatBackend>,
    runtime: Handle,
    store: SessionStore,
    settings: Settings,
    theme: Theme,
    sessions: Vec<SessionMeta>,
    chat: ChatSession,
    input_buffer: String,
    diagnostics_log: Vec<String>,
    session_unavailable: bool,
    visuals_applied: bool,
}

impl ScribeApp {
    pub fn new(
        rx: Receiver<AppEvent>,
        tx: EventSink,
        backend: Arc<dyn ChatBackend>,
        runtime: Handle,
        settings: Settings,
        startup_warnings: Vec<String>,
    ) -> Self {
        let store = SessionStore::new(settings.sessions_dir());
        let (sessions, warnings) = store.load_all();
        let meta = sessions
            .first()
            .cloned()
            .unwrap_or_else(|| SessionMeta::new(Message::new_id(), timestamp_millis()));
        let chat = ChatSession::open(
            meta,
            store.clone(),
            Arc::clone(&backend),
            runtime.clone(),
            tx.clone(),
            &settings,
        );

        let mut app = Self {
            rx,
            tx,
            backend,
            runtime,
            store,
            settings,
            theme: Theme::default(),
            sessions,
            chat,
            input_buffer: String::new(),
            diagnostics_log: Vec::new(),
            session_unavailable: false,
            visuals_applied: false,
        };

        for warning in startup_warnings.into_iter().chain(warnings) {
            app.log_diagnostic(format!("warning: {warning}"));
        }
        app
    }

    fn timestamp() -> String {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(duration) => duration.as_secs().to_string(),
            Err(_) => "0".to_string(),
        }
    }

    fn log_diagnostic(&mut self, message: impl Into<String>) {
        if self.diagnostics_log.len() >= DIAGNOSTICS_LIMIT {
            self.diagnostics_log.remove(0);
        }
        self.diagnostics_log
            .push(format!("[{}] {}", Self::timestamp(), message.into()));
    }

    fn refresh_sessions(&mut self) {
        let (sessions, warnings) = self.store.load_all();
        self.sessions = sessions;
        for warning in warnings {
            self.log_diagnostic(format!("session load warning: {warning}"));
        }
    }

    fn replace_chat(&mut self, meta: SessionMeta) {
        self.chat.stop();
        self.chat.save();
        info!(session_id = %meta.session_id, "opening session");
        self.chat = ChatSession::open(
            meta,
            self.store.clone(),
            Arc::clone(&self.backend),
            self.runtime.clone(),
            self.tx.clone(),
            &self.settings,
        );
        self.session_unavailable = false;
    }

    fn new_session(&mut self) {
        let meta = SessionMeta::new(Message::new_id(), timestamp_millis());
        if let Err(err) = self.store.save(&meta) {
            self.log_diagnostic(format!("failed to persist new session: {err}"));
        }
        self.replace_chat(meta);
        self.refresh_sessions();
    }

    fn open_session(&mut self, session_id: &str) {
        if session_id == self.chat.session_id() {
            return;
        }
        match self.store.load_one(session_id) {
            Ok(meta) => self.replace_chat(meta),
            Err(err) => {
                warn!("failed to open session: {err}");
                self.log_diagnostic(format!("failed to open session: {err}"));
                self.session_unavailable = true;
            }
        }
    }

    fn submit_prompt(&mut self, ctx: &egui::Context) {
        let prompt = self.input_buffer.trim().to_string();
        match self.chat.send(&prompt) {
            Ok(()) => {
                self.input_buffer.clear();
                self.refresh_sessions();
            }
            Err(err) => self.log_diagnostic(format!("send rejected: {err}")),
        }
        ctx.request_repaint();
    }

    fn drain_events(&mut self, ctx: &egui::Context) {
        let mut received = false;
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    received = true;
                    self.log_event(&event);
                    self.chat.handle_event(event);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.log_diagnostic("event channel disconnected");
                    break;
                }
            }
        }

        for notice in self.chat.take_notices() {
            self.log_diagnostic(notice);
        }
        if received || self.chat.is_streaming() {
            ctx.request_repaint();
        }
    }

    fn log_event(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Stream { event, .. } => match event.kind() {
                "text_delta" | "thinking_delta" => {}
                kind => self.log_diagnostic(format!("stream event: {kind}")),
            },
            AppEvent::CancelAcknowledged { .. } => self.log_diagnostic("stop acknowledged"),
            AppEvent::CancelTimedOut { .. } => {}
            AppEvent::HistoryPage { messages, .. } => {
                self.log_diagnostic(format!("loaded {} older messages", messages.len()));
            }
            AppEvent::HistoryFailed { .. } => {}
            AppEvent::TransportError { error, .. } => {
                self.log_diagnostic(format!("transport error: {error}"));
            }
        }
    }

    fn render_top_bar(&mut self, ctx: &egui::Context) {
        let streaming = self.chat.is_streaming();
        let (status_label, status_color) = if streaming {
            ("Streaming", self.theme.warning)
        } else {
            ("Idle", self.theme.success)
        };

        let mut stop_clicked = false;
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.strong("Scribe");
                ui.separator();
                ui.label(RichText::new(status_label).color(status_color));
                let steps = self.chat.steps();
                if let Some(step) = steps.current() {
                    let done = steps.steps().iter().filter(|s| s.status.is_terminal()).count();
                    ui.separator();
                    ui.label(
                        RichText::new(format!("tool: {} ({}/{})", step.label, done + 1, steps.steps().len()))
                            .color(self.theme.text_muted),
                    );
                }
                ui.separator();
                stop_clicked = ui.add_enabled(streaming, egui::Button::new("Stop")).clicked();
            });
        });

        if stop_clicked && self.chat.stop() {
            self.log_diagnostic("stop requested");
        }
    }

    fn render_left_panel(&mut self, ctx: &egui::Context) {
        let mut clicked_session: Option<String> = None;
        let mut create_session = false;
        egui::SidePanel::left("sessions_panel")
            .resizable(true)
            .show(ctx, |ui| {
                ui.heading("Sessions");
                if ui.button("New session").clicked() {
                    create_session = true;
                }
                ui.separator();

                ScrollArea::vertical().id_salt("sessions_list").show(ui, |ui| {
                    for session in &self.sessions {
                        let label = session
                            .title
                            .clone()
                            .unwrap_or_else(|| session.session_id.clone());
                        let selected = session.session_id == self.chat.session_id();
                        if ui.selectable_label(selected, label).clicked() {
                            clicked_session = Some(session.session_id.clone());
                        }
                    }
                });
            });

        if create_session {
            self.new_session();
        } else if let Some(session_id) = clicked_session {
            self.open_session(&session_id);
        }
    }

    fn render_canvas_panel(&mut self, ctx: &egui::Context) {
        let theme = &self.theme;
        let canvas = self.chat.canvas_mut();
        let mut focus: Option<String> = None;
        let mut minimize: Option<String> = None;
        let mut close: Option<String> = None;

        egui::SidePanel::right("canvas_panel")
            .resizable(true)
            .default_width(420.0)
            .show(ctx, |ui| {
                ui.heading("Canvas");
                ui.separator();

                if canvas.documents.is_empty() {
                    ui.label(RichText::new("Nothing open yet").color(theme.text_muted));
                    return;
                }

                ui.horizontal_wrapped(|ui| {
                    for document in &canvas.documents {
                        let active = canvas.active_path.as_deref() == Some(document.path.as_str());
                        let mut label = RichText::new(&document.path);
                        if document.minimized {
                            label = label.color(theme.text_muted);
                        }
                        if ui.selectable_label(active, label).clicked() {
                            focus = Some(document.path.clone());
                        }
                    }
                });
                ui.separator();

                let Some(document) = canvas.active_document() else {
                    return;
                };
                ui.horizontal(|ui| {
                    ui.label(RichText::new(document.kind.label()).color(theme.text_muted));
                    if !document.is_complete {
                        ui.spinner();
                        ui.label(RichText::new("writing...").color(theme.warning));
                    }
                    if ui.button("Minimize").clicked() {
                        minimize = Some(document.path.clone());
                    }
                    if ui.button("Close").clicked() {
                        close = Some(document.path.clone());
                    }
                });

                theme.canvas_frame().show(ui, |ui| {
                    ScrollArea::vertical()
                        .id_salt(("canvas_document", &document.path))
                        .auto_shrink([false, false])
                        .stick_to_bottom(!document.is_complete)
                        .show(ui, |ui| {
                            ui.label(RichText::new(&document.content).monospace());
                        });
                });

                if let Some(last) = canvas.actions().last() {
                    let actor = match last.actor {
                        CanvasActor::User => "you",
                        CanvasActor::Assistant => "assistant",
                    };
                    let action = format!("{:?}", last.action).to_lowercase();
                    ui.label(
                        RichText::new(format!("last change: {action} {} by {actor}", last.path))
                            .small()
                            .color(theme.text_muted),
                    );
                }
            });

        if let Some(path) = focus {
            canvas.focus(&path);
        }
        if let Some(path) = minimize {
            canvas.minimize(&path);
        }
        if let Some(path) = close {
            canvas.close(&path);
        }
    }

    fn render_center_panel(&mut self, ctx: &egui::Context) {
        let mut send_now = false;
        let mut action: Option<(String, MessageAction)> = None;
        let mut load_more = false;

        egui::CentralPanel::default().show(ctx, |ui| {
            let title = self
                .chat
                .meta()
                .title
                .clone()
                .unwrap_or_else(|| "Chat".to_string());
            ui.heading(title);
            ui.separator();

            if self.session_unavailable {
                ui.label(RichText::new("Session unavailable").color(self.theme.danger));
            }

            let transcript_height = (ui.available_height() - 170.0).max(120.0);
            let pager = self.chat.pagination_state();
            let theme = &self.theme;
            let (list, messages, pending) = self.chat.list_parts();
            ui.allocate_ui(egui::vec2(ui.available_width(), transcript_height), |ui| {
                let output = show_message_list(ui, list, messages, pending, pager, theme);
                load_more = output.load_more_requested;
                action = output.action;
            });

            ui.separator();
            egui::CollapsingHeader::new("Diagnostics")
                .default_open(false)
                .show(ui, |ui| {
                    ScrollArea::vertical()
                        .id_salt("diagnostics_log")
                        .max_height(90.0)
                        .stick_to_bottom(true)
                        .show(ui, |ui| {
                            for entry in &self.diagnostics_log {
                                ui.label(entry);
                            }
                        });
                });

            ui.separator();
            let input_enabled = !self.chat.is_streaming();
            let hint = if input_enabled {
                "Type a message..."
            } else {
                "Waiting for response..."
            };

            ui.horizontal(|ui| {
                let response = ui.add_enabled(
                    input_enabled,
                    egui::TextEdit::singleline(&mut self.input_buffer)
                        .desired_width(f32::INFINITY)
                        .hint_text(hint),
                );
                if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                    send_now = true;
                }

                let clicked = ui
                    .add_enabled(
                        input_enabled && !self.input_buffer.trim().is_empty(),
                        egui::Button::new("Send"),
                    )
                    .clicked();
                send_now |= clicked;
            });
        });

        if load_more && self.chat.request_older_page() {
            self.log_diagnostic("loading older messages");
        }
        if let Some((message_id, action)) = action {
            match action {
                MessageAction::Retry => {
                    if let Err(err) = self.chat.retry() {
                        self.log_diagnostic(format!("retry rejected: {err}"));
                    }
                }
                MessageAction::OpenInCanvas(path) => self.chat.open_in_canvas(&message_id, &path),
            }
        }
        if send_now && !self.chat.is_streaming() {
            self.submit_prompt(ctx);
        }
    }
}

impl eframe::App for ScribeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if !self.visuals_applied {
            self.theme.apply_visuals(ctx);
            self.visuals_applied = true;
        }
        self.drain_events(ctx);
        self.render_top_bar(ctx);
        self.render_left_panel(ctx);
        self.render_canvas_panel(ctx);
        self.render_center_panel(ctx);
    }
}
