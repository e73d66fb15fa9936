use crate::stream::message::Role;
use eframe::egui::{self, Color32, CornerRadius, FontId, Frame, Margin, Stroke, TextStyle};

/// Light "paper and ink" palette for the transcript and canvas.
#[derive(Debug, Clone)]
pub struct Theme {
    pub ink: Color32,
    pub text_muted: Color32,
    pub paper: Color32,
    pub user_bubble: Color32,
    pub assistant_bubble: Color32,
    pub system_bubble: Color32,
    pub code_background: Color32,
    pub rule: Color32,
    pub success: Color32,
    pub warning: Color32,
    pub danger: Color32,
    /// Space added below each transcript bubble when measuring it.
    pub bubble_gap: f32,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            ink: Color32::from_rgb(0x2B, 0x2A, 0x33),
            text_muted: Color32::from_rgb(0x77, 0x72, 0x6B),
            paper: Color32::from_rgb(0xFA, 0xF7, 0xF0),
            user_bubble: Color32::from_rgb(0xE8, 0xEE, 0xF7),
            assistant_bubble: Color32::from_rgb(0xFF, 0xFD, 0xF8),
            system_bubble: Color32::from_rgb(0xF1, 0xEC, 0xE2),
            code_background: Color32::from_rgb(0xF0, 0xEE, 0xE9),
            rule: Color32::from_rgb(0xDD, 0xD6, 0xC9),
            success: Color32::from_rgb(0x2E, 0x7D, 0x4F),
            warning: Color32::from_rgb(0xB4, 0x6A, 0x12),
            danger: Color32::from_rgb(0xB3, 0x26, 0x1E),
            bubble_gap: 10.0,
        }
    }
}

impl Theme {
    pub fn apply_visuals(&self, ctx: &egui::Context) {
        let mut visuals = egui::Visuals::light();
        visuals.panel_fill = self.paper;
        visuals.window_fill = self.paper;
        visuals.override_text_color = Some(self.ink);
        visuals.widgets.noninteractive.bg_stroke = Stroke::new(1.0, self.rule);

        let mut style = (*ctx.style()).clone();
        style.visuals = visuals;
        style.text_styles.insert(TextStyle::Body, FontId::proportional(15.0));
        style.text_styles.insert(TextStyle::Monospace, FontId::monospace(13.5));
        ctx.set_style(style);
    }

    pub fn bubble_frame(&self, role: Role) -> Frame {
        let fill = match role {
            Role::User => self.user_bubble,
            Role::Assistant => self.assistant_bubble,
            Role::System => self.system_bubble,
        };
        Frame::new()
            .fill(fill)
            .inner_margin(Margin::symmetric(12, 8))
            .corner_radius(CornerRadius::same(6))
            .stroke(Stroke::new(1.0, self.rule))
    }

    pub fn code_frame(&self) -> Frame {
        Frame::new()
            .fill(self.code_background)
            .inner_margin(Margin::same(6))
            .corner_radius(CornerRadius::same(4))
    }

    /// Sheet-of-paper look for canvas documents.
    pub fn canvas_frame(&self) -> Frame {
        Frame::new()
            .fill(Color32::WHITE)
            .inner_margin(Margin::symmetric(16, 12))
            .stroke(Stroke::new(1.0, self.rule))
    }
}
