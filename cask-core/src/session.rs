use std::sync::Mutex;

use crate::error::{CaskError, Result};
use crate::manifest::FolderRef;

/// Ephemeral "current folder" marker bridging the ingestion step and the
/// player step within one process. Not persisted: a fresh run starts with
/// no session, and consumers that need durability take the reference
/// explicitly instead.
#[derive(Default)]
pub struct SessionBroker {
    current: Mutex<Option<FolderRef>>,
}

impl SessionBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_current(&self, folder_ref: FolderRef) {
        *self.current.lock().unwrap() = Some(folder_ref);
    }

    pub fn current(&self) -> Option<FolderRef> {
        self.current.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        *self.current.lock().unwrap() = None;
    }

    /// The player-side contract: absent means the caller must send the user
    /// back to ingestion, not render.
    pub fn require_current(&self) -> Result<FolderRef> {
        self.current().ok_or(CaskError::NoActiveSession)
    }
}
