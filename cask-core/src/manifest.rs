use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier scoping one ingestion run's manifest and payloads.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct FolderRef(String);

impl FolderRef {
    /// A fresh reference for a new ingestion run.
    pub fn generate() -> Self {
        FolderRef(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FolderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for FolderRef {
    fn from(s: String) -> Self {
        FolderRef(s)
    }
}

impl From<&str> for FolderRef {
    fn from(s: &str) -> Self {
        FolderRef(s.to_string())
    }
}

/// Content-addressed reference to one payload: BLAKE3 of the raw bytes.
/// Identical file contents share a single payload.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ContentRef(String);

impl ContentRef {
    pub fn for_bytes(bytes: &[u8]) -> Self {
        ContentRef(blake3::hash(bytes).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ContentRef {
    fn from(s: String) -> Self {
        ContentRef(s)
    }
}

/// One file within an ingested folder. `content_ref` is `None` when the
/// file's bytes could not be read during the walk.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FileEntry {
    pub name: String,
    pub rel_path: String,
    pub media_type: String,
    pub size: u64,
    pub content_ref: Option<ContentRef>,
}

/// Ordered manifest of one ingestion run. Entry order is discovery order
/// (depth-first, directory read order) and is stable within one run.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FolderManifest {
    pub name: String,
    pub created_utc: String,
    pub files: Vec<FileEntry>,
}

impl FolderManifest {
    pub fn new(name: impl Into<String>) -> Self {
        FolderManifest {
            name: name.into(),
            created_utc: Utc::now().to_rfc3339(),
            files: Vec::new(),
        }
    }

    pub fn entry(&self, rel_path: &str) -> Option<&FileEntry> {
        self.files.iter().find(|e| e.rel_path == rel_path)
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|e| e.size).sum()
    }
}
