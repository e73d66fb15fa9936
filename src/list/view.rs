use crate::list::{PaginationState, ScrollBehavior, ScrollCommand, ScrollMetrics, VirtualizedMessageList};
use crate::stream::message::{ContentBlock, Message, MessageStatus, Role, ToolStatus};
use crate::theme::Theme;
use eframe::egui::{self, Align, Rect, RichText, ScrollArea, UiBuilder};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageAction {
    Retry,
    OpenInCanvas(String),
}

#[derive(Debug, Default)]
pub struct ListOutput {
    pub load_more_requested: bool,
    pub action: Option<(String, MessageAction)>,
}

/// Renders `messages` through the list model and applies `pending` scrolls.
///
/// `pending` carries commands produced by `sync` or height measurement across
/// frames; it is consumed here once a scroll area exists.
pub fn show_message_list(
    ui: &mut egui::Ui,
    list: &mut VirtualizedMessageList,
    messages: &[Message],
    pending: &mut ScrollCommand,
    pager: PaginationState,
    theme: &Theme,
) -> ListOutput {
    let mut output = ListOutput::default();
    let command = std::mem::replace(pending, ScrollCommand::None);

    let mut area = ScrollArea::vertical()
        .id_salt("chat_transcript")
        .auto_shrink([false, false]);
    match command {
        ScrollCommand::ToOffset(offset) => area = area.vertical_scroll_offset(offset),
        ScrollCommand::ToBottom(ScrollBehavior::Instant) => {
            // egui clamps the offset to the scrollable range.
            area = area.vertical_scroll_offset(list.total_height());
        }
        ScrollCommand::ToBottom(ScrollBehavior::Smooth) | ScrollCommand::None => {}
    }

    if pager.is_loading_more || list.is_loading_more() {
        ui.label(RichText::new("Loading earlier messages...").color(theme.text_muted));
    }

    let mut next_command = ScrollCommand::None;
    if !list.anchor().is_at_bottom && !messages.is_empty() && ui.button("Jump to latest").clicked() {
        next_command = list.jump_to_bottom();
    }
    area.show_viewport(ui, |ui, viewport| {
        let total = list.total_height();
        ui.set_min_height(total);

        output.load_more_requested = list.on_scroll(
            ScrollMetrics {
                scroll_top: viewport.min.y,
                scroll_height: total,
                client_height: viewport.height(),
            },
            pager,
        );

        let origin = ui.max_rect().min;
        let width = ui.available_width();
        for index in list.visible_range() {
            let Some(message) = messages.get(index) else {
                break;
            };
            if list.id_at(index) != Some(message.id.as_str()) {
                continue;
            }

            let top = origin.y + list.offset_of(index);
            let rect = Rect::from_min_size(
                egui::pos2(origin.x, top),
                egui::vec2(width, list.item_height(&message.id)),
            );
            let inner = ui.scope_builder(UiBuilder::new().max_rect(rect), |ui| {
                render_message(ui, message, theme)
            });
            if let Some(action) = inner.inner {
                output.action = Some((message.id.clone(), action));
            }

            let measured = inner.response.rect.height() + theme.bubble_gap;
            let command = list.record_height(&message.id, measured);
            if command != ScrollCommand::None {
                next_command = command;
            }
        }

        if command == ScrollCommand::ToBottom(ScrollBehavior::Smooth) {
            let bottom = egui::pos2(origin.x, origin.y + list.total_height());
            ui.scroll_to_rect(Rect::from_min_size(bottom, egui::vec2(1.0, 1.0)), Some(Align::BOTTOM));
        }
    });

    if next_command != ScrollCommand::None {
        *pending = next_command;
        ui.ctx().request_repaint();
    }
    output
}

fn render_message(ui: &mut egui::Ui, message: &Message, theme: &Theme) -> Option<MessageAction> {
    let mut action = None;
    let label = match message.role {
        Role::User => "You",
        Role::Assistant => "Assistant",
        Role::System => "System",
    };

    theme.bubble_frame(message.role).show(ui, |ui| {
        ui.set_width(ui.available_width());
        ui.horizontal(|ui| {
            ui.label(RichText::new(label).strong());
            if message.status == MessageStatus::Streaming {
                ui.spinner();
            }
        });

        if !message.thinking.is_empty() {
            egui::CollapsingHeader::new(RichText::new("Thinking").color(theme.text_muted))
                .id_salt(("thinking", &message.id))
                .default_open(false)
                .show(ui, |ui| {
                    ui.label(RichText::new(&message.thinking).italics().color(theme.text_muted));
                });
        }

        if message.status == MessageStatus::Streaming {
            // Blocks are only segmented once the message is frozen.
            render_streaming_body(ui, message, theme);
        } else {
            render_blocks(ui, message, theme);
        }

        for block in &message.parsed.blocks {
            ui.horizontal(|ui| {
                let state = if block.is_complete { "" } else { " (writing...)" };
                if ui.button(format!("Open {}{state}", block.path)).clicked() {
                    action = Some(MessageAction::OpenInCanvas(block.path.clone()));
                }
            });
        }

        if message.status == MessageStatus::Error {
            ui.horizontal(|ui| {
                let error = message.error.as_deref().unwrap_or("response failed");
                ui.label(RichText::new(format!("Error: {error}")).color(theme.danger));
                if ui.button("Retry").clicked() {
                    action = Some(MessageAction::Retry);
                }
            });
        }
    });

    action
}

fn render_streaming_body(ui: &mut egui::Ui, message: &Message, theme: &Theme) {
    for block in &message.blocks {
        if let ContentBlock::ToolUse { tool_call } = block {
            render_tool_call(ui, &tool_call.name, tool_call.status, tool_call.output.as_deref(), theme);
        }
    }
    let text = message.display_text();
    if !text.is_empty() {
        ui.label(text);
    }
}

fn render_blocks(ui: &mut egui::Ui, message: &Message, theme: &Theme) {
    if !message.parsed.blocks.is_empty() {
        for block in &message.blocks {
            if let ContentBlock::ToolUse { tool_call } = block {
                render_tool_call(ui, &tool_call.name, tool_call.status, tool_call.output.as_deref(), theme);
            }
        }
        ui.label(message.display_text());
        return;
    }

    for block in &message.blocks {
        match block {
            ContentBlock::Text { text } => {
                ui.label(text.trim_end());
            }
            ContentBlock::Code { language, code } => {
                if let Some(language) = language {
                    ui.label(RichText::new(language).small().color(theme.text_muted));
                }
                theme.code_frame().show(ui, |ui| {
                    ui.label(RichText::new(code.trim_end()).monospace());
                });
            }
            ContentBlock::Image { alt, source } => {
                ui.label(RichText::new(format!("[image: {alt}] {source}")).color(theme.text_muted));
            }
            ContentBlock::ToolUse { tool_call } => {
                render_tool_call(ui, &tool_call.name, tool_call.status, tool_call.output.as_deref(), theme);
            }
        }
    }
}

fn render_tool_call(
    ui: &mut egui::Ui,
    name: &str,
    status: ToolStatus,
    output: Option<&str>,
    theme: &Theme,
) {
    let (marker, color) = match status {
        ToolStatus::Running => ("running", theme.warning),
        ToolStatus::Completed => ("done", theme.success),
        ToolStatus::Failed => ("failed", theme.danger),
    };
    ui.horizontal(|ui| {
        ui.label(RichText::new(format!("tool {name}")).monospace());
        ui.label(RichText::new(marker).color(color));
    });
    if let Some(output) = output.filter(|output| !output.is_empty()) {
        ui.label(RichText::new(output).small().color(theme.text_muted));
    }
}
