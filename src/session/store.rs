use crate::error::StoreError;
use crate::session::{HistoryPage, SessionMeta, SCHEMA_VERSION};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

fn read_session_file(path: &Path) -> Result<SessionMeta, StoreError> {
    let data = fs::read(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let session: SessionMeta = serde_json::from_slice(&data).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    if session.schema_version != SCHEMA_VERSION {
        return Err(StoreError::UnknownSchema {
            path: path.to_path_buf(),
            version: session.schema_version,
        });
    }
    Ok(session)
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    pub fn ensure_dir(&self) -> Result<&Path, StoreError> {
        fs::create_dir_all(&self.dir)?;
        Ok(&self.dir)
    }

    pub fn save(&self, meta: &SessionMeta) -> Result<(), StoreError> {
        let dir = self.ensure_dir()?;
        let final_path = self.session_path(&meta.session_id);
        let tmp_path = dir.join(format!("{}.json.tmp", meta.session_id));
        let bytes = serde_json::to_vec_pretty(meta)?;

        fs::write(&tmp_path, bytes)?;
        match fs::rename(&tmp_path, &final_path) {
            Ok(()) => Ok(()),
            Err(rename_err) => {
                if final_path.exists() {
                    fs::remove_file(&final_path)?;
                    fs::rename(&tmp_path, &final_path)?;
                    Ok(())
                } else {
                    Err(rename_err.into())
                }
            }
        }
    }

    /// All readable sessions, newest first, plus one warning per unreadable file.
    pub fn load_all(&self) -> (Vec<SessionMeta>, Vec<String>) {
        let mut sessions = Vec::new();
        let mut warnings = Vec::new();

        let dir = match self.ensure_dir() {
            Ok(dir) => dir,
            Err(err) => {
                warnings.push(format!("failed to initialize sessions directory: {err}"));
                return (sessions, warnings);
            }
        };

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                warnings.push(format!("failed to read sessions directory: {err}"));
                return (sessions, warnings);
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension() != Some(OsStr::new("json")) {
                continue;
            }

            match read_session_file(&path) {
                Ok(session) => sessions.push(session),
                Err(err) => {
                    warn!(path = %path.display(), "skipping session file: {err}");
                    warnings.push(err.to_string());
                }
            }
        }

        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        (sessions, warnings)
    }

    pub fn load_one(&self, session_id: &str) -> Result<SessionMeta, StoreError> {
        let path = self.ensure_dir()?.join(format!("{session_id}.json"));
        if !path.exists() {
            return Err(StoreError::Missing {
                session_id: session_id.to_string(),
                path,
            });
        }
        read_session_file(&path)
    }

    /// Reads the `limit` persisted messages that precede index `end`.
    pub fn load_page(&self, session_id: &str, end: usize, limit: usize) -> Result<HistoryPage, StoreError> {
        let session = self.load_one(session_id)?;
        Ok(HistoryPage::slice(&session.messages, end, limit))
    }
}
