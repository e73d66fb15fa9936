use crate::canvas::bridge::CanvasSink;
use serde::{Deserialize, Serialize};
use tracing::debug;

const ACTION_LOG_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanvasKind {
    Document,
    Poster,
    Music,
    Script,
    Novel,
}

impl CanvasKind {
    pub fn from_path(path: &str) -> Self {
        let lowered = path.to_ascii_lowercase();
        let file_name = lowered.rsplit('/').next().unwrap_or(lowered.as_str());
        if file_name.contains("poster") {
            Self::Poster
        } else if file_name.ends_with(".abc") || file_name.contains("music") || file_name.contains("lyrics") {
            Self::Music
        } else if file_name.ends_with(".fountain") || file_name.contains("script") {
            Self::Script
        } else if file_name.contains("novel") || file_name.contains("chapter") {
            Self::Novel
        } else {
            Self::Document
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Document => "Document",
            Self::Poster => "Poster",
            Self::Music => "Music",
            Self::Script => "Script",
            Self::Novel => "Novel",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasDocument {
    pub path: String,
    pub kind: CanvasKind,
    pub content: String,
    pub is_complete: bool,
    #[serde(default)]
    pub minimized: bool,
    #[serde(default)]
    pub revision: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanvasActionType {
    Open,
    Update,
    Focus,
    Minimize,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanvasActor {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasAction {
    pub action: CanvasActionType,
    pub actor: CanvasActor,
    pub path: String,
    pub streaming: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CanvasWorkspaceState {
    #[serde(default)]
    pub documents: Vec<CanvasDocument>,
    #[serde(default)]
    pub active_path: Option<String>,
    #[serde(skip)]
    actions: Vec<CanvasAction>,
}

impl CanvasWorkspaceState {
    pub fn document(&self, path: &str) -> Option<&CanvasDocument> {
        self.documents.iter().find(|document| document.path == path)
    }

    pub fn active_document(&self) -> Option<&CanvasDocument> {
        self.active_path.as_deref().and_then(|path| self.document(path))
    }

    pub fn actions(&self) -> &[CanvasAction] {
        &self.actions
    }

    fn record(&mut self, action: CanvasActionType, actor: CanvasActor, path: &str, streaming: bool) {
        if self.actions.len() >= ACTION_LOG_LIMIT {
            self.actions.remove(0);
        }
        self.actions.push(CanvasAction {
            action,
            actor,
            path: path.to_string(),
            streaming,
        });
    }

    pub fn focus(&mut self, path: &str) {
        let Some(document) = self.documents.iter_mut().find(|document| document.path == path) else {
            return;
        };
        document.minimized = false;
        self.active_path = Some(path.to_string());
        self.record(CanvasActionType::Focus, CanvasActor::User, path, false);
    }

    pub fn minimize(&mut self, path: &str) {
        let Some(document) = self.documents.iter_mut().find(|document| document.path == path) else {
            return;
        };
        document.minimized = true;
        if self.active_path.as_deref() == Some(path) {
            self.active_path = None;
        }
        self.record(CanvasActionType::Minimize, CanvasActor::User, path, false);
    }

    pub fn close(&mut self, path: &str) {
        let before = self.documents.len();
        self.documents.retain(|document| document.path != path);
        if self.documents.len() == before {
            return;
        }
        if self.active_path.as_deref() == Some(path) {
            self.active_path = self.documents.last().map(|document| document.path.clone());
        }
        self.record(CanvasActionType::Close, CanvasActor::User, path, false);
    }
}

impl CanvasSink for CanvasWorkspaceState {
    fn on_canvas_update(&mut self, path: &str, content: &str, is_complete: bool) {
        let action = match self.documents.iter_mut().find(|document| document.path == path) {
            Some(document) => {
                document.content = content.to_string();
                document.is_complete = is_complete;
                document.minimized = false;
                document.revision = document.revision.saturating_add(1);
                CanvasActionType::Update
            }
            None => {
                self.documents.push(CanvasDocument {
                    path: path.to_string(),
                    kind: CanvasKind::from_path(path),
                    content: content.to_string(),
                    is_complete,
                    minimized: false,
                    revision: 0,
                });
                CanvasActionType::Open
            }
        };
        debug!(path, ?action, is_complete, "canvas update");
        self.active_path = Some(path.to_string());
        self.record(action, CanvasActor::Assistant, path, !is_complete);
    }
}
