use crate::error::{CaskError, Result};
use crate::manifest::FileEntry;
use crate::media;
use crate::store::Vault;

/// What a viewer should display for one entry.
#[derive(Debug)]
pub enum Preview {
    Text { rel_path: String, text: String },
    Image { rel_path: String, media_type: String, bytes: Vec<u8> },
    /// No retrievable content, or a type the viewer does not render.
    Metadata { rel_path: String, media_type: String, size: u64 },
    /// Payload retrieved but undecodable; per-file and non-fatal.
    DecodeFailed { rel_path: String, reason: String },
}

/// Generic single-entry view: fetch the payload and classify it by media
/// type. Store failures propagate; decode failures do not.
pub fn preview(vault: &Vault, entry: &FileEntry) -> Result<Preview> {
    let Some(content_ref) = &entry.content_ref else {
        return Ok(Preview::Metadata {
            rel_path: entry.rel_path.clone(),
            media_type: entry.media_type.clone(),
            size: entry.size,
        });
    };
    let bytes = vault.payload(content_ref)?.ok_or_else(|| CaskError::ContentUnavailable {
        entry: entry.rel_path.clone(),
        content_ref: content_ref.to_string(),
    })?;
    if media::is_image(&entry.media_type) {
        return Ok(Preview::Image {
            rel_path: entry.rel_path.clone(),
            media_type: entry.media_type.clone(),
            bytes,
        });
    }
    if media::is_textual(&entry.media_type) {
        return Ok(match String::from_utf8(bytes) {
            Ok(text) => Preview::Text { rel_path: entry.rel_path.clone(), text },
            Err(e) => Preview::DecodeFailed {
                rel_path: entry.rel_path.clone(),
                reason: e.to_string(),
            },
        });
    }
    Ok(Preview::Metadata {
        rel_path: entry.rel_path.clone(),
        media_type: entry.media_type.clone(),
        size: entry.size,
    })
}
