use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CaskError>;

/// Error taxonomy for the vault and its consumers.
///
/// Absent data is not an error: lookups return `Ok(None)`. These variants
/// cover transport and integrity failures that callers must surface.
#[derive(Debug, Error)]
pub enum CaskError {
    #[error("storage unavailable at {path}: {source}")]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("content for entry {entry} is unavailable (ref {content_ref})")]
    ContentUnavailable { entry: String, content_ref: String },

    #[error("runtime bundle incomplete, missing: {}", missing.join(", "))]
    MissingBundleAsset { missing: Vec<String> },

    #[error("no active session, ingest a folder first")]
    NoActiveSession,

    #[error("corrupt payload {content_ref}: {reason}")]
    CorruptPayload { content_ref: String, reason: String },

    #[error("payload compression failed: {0}")]
    Compress(#[source] io::Error),

    #[error("i/o on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("manifest encode/decode: {0}")]
    Json(#[from] serde_json::Error),

    #[error("catalog encode/decode: {0}")]
    Catalog(#[from] bincode::Error),
}

impl CaskError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CaskError::Io { path: path.into(), source }
    }
}
