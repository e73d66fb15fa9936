use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown schema_version in {path}: {version}")]
    UnknownSchema { path: PathBuf, version: u32 },

    #[error("session file missing for id {session_id}: {path}")]
    Missing { session_id: String, path: PathBuf },

    #[error("session store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode session: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("stream rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("a response is still streaming")]
    StreamInProgress,

    #[error("prompt is empty")]
    EmptyPrompt,

    #[error("no user prompt to retry")]
    NothingToRetry,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("unknown workflow step {0}")]
    UnknownStep(String),

    #[error("step {step_id} cannot move from {from} to {to}")]
    InvalidTransition {
        step_id: String,
        from: String,
        to: String,
    },

    #[error("workflow step {0} already exists")]
    DuplicateStep(String),
}
