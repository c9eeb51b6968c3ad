use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{CaskError, Result};
use crate::manifest::{FileEntry, FolderManifest};
use crate::store::Vault;

/// Runtime-bundle quartet, located by filename-suffix convention.
pub const LOADER_SUFFIX: &str = ".loader.js";
pub const DATA_SUFFIX: &str = ".data";
pub const FRAMEWORK_SUFFIX: &str = ".framework.js";
pub const CODE_SUFFIX: &str = ".wasm";

pub const JS_MEDIA_TYPE: &str = "text/javascript";
pub const DATA_MEDIA_TYPE: &str = "application/octet-stream";
pub const WASM_MEDIA_TYPE: &str = "application/wasm";

/// One reconstructed resource: bytes materialized on disk, tagged with the
/// media type the downstream runtime expects.
#[derive(Debug)]
pub struct AssetHandle {
    pub rel_path: String,
    pub media_type: &'static str,
    pub path: PathBuf,
    pub size: u64,
}

/// The four handles the runtime consumes, backed by one handout directory.
#[derive(Debug)]
pub struct BundleAssets {
    pub loader: AssetHandle,
    pub data: AssetHandle,
    pub framework: AssetHandle,
    pub code: AssetHandle,
    handout: PathBuf,
}

impl BundleAssets {
    pub fn handles(&self) -> [&AssetHandle; 4] {
        [&self.loader, &self.data, &self.framework, &self.code]
    }

    /// Revoke the handles by removing the handout directory. Skipping this
    /// leaks the materialized files; it does not affect the store.
    pub fn release(self) -> Result<()> {
        fs::remove_dir_all(&self.handout).map_err(|e| CaskError::io(&self.handout, e))
    }
}

/// Locate the quartet in `manifest`, fetch all four payloads, and materialize
/// them under `out_dir` (which the bundle owns until released).
///
/// `out_dir` must not already contain files: the bundle owns the directory
/// whole, so release and failure unwinding remove it entirely.
///
/// All-or-nothing: a missing suffix fails with every absent suffix named, an
/// unavailable payload fails before anything is written, and a failed write
/// unwinds the handout directory.
pub fn reconstruct(vault: &Vault, manifest: &FolderManifest, out_dir: &Path) -> Result<BundleAssets> {
    let loader_entry = find_suffix(manifest, LOADER_SUFFIX);
    let data_entry = find_suffix(manifest, DATA_SUFFIX);
    let framework_entry = find_suffix(manifest, FRAMEWORK_SUFFIX);
    let code_entry = find_suffix(manifest, CODE_SUFFIX);

    let mut missing = Vec::new();
    for (suffix, found) in [
        (LOADER_SUFFIX, loader_entry.is_some()),
        (DATA_SUFFIX, data_entry.is_some()),
        (FRAMEWORK_SUFFIX, framework_entry.is_some()),
        (CODE_SUFFIX, code_entry.is_some()),
    ] {
        if !found {
            missing.push(suffix.to_string());
        }
    }
    let (Some(loader_entry), Some(data_entry), Some(framework_entry), Some(code_entry)) =
        (loader_entry, data_entry, framework_entry, code_entry)
    else {
        return Err(CaskError::MissingBundleAsset { missing });
    };

    // Every payload is fetched before anything is materialized.
    let loader_bytes = fetch(vault, loader_entry)?;
    let data_bytes = fetch(vault, data_entry)?;
    let framework_bytes = fetch(vault, framework_entry)?;
    let code_bytes = fetch(vault, code_entry)?;

    if let Ok(mut entries) = fs::read_dir(out_dir) {
        if entries.next().is_some() {
            return Err(CaskError::io(
                out_dir,
                io::Error::new(io::ErrorKind::AlreadyExists, "handout directory is not empty"),
            ));
        }
    }
    fs::create_dir_all(out_dir).map_err(|e| CaskError::io(out_dir, e))?;
    let written = (|| -> Result<BundleAssets> {
        Ok(BundleAssets {
            loader: materialize(out_dir, loader_entry, JS_MEDIA_TYPE, &loader_bytes)?,
            data: materialize(out_dir, data_entry, DATA_MEDIA_TYPE, &data_bytes)?,
            framework: materialize(out_dir, framework_entry, JS_MEDIA_TYPE, &framework_bytes)?,
            code: materialize(out_dir, code_entry, WASM_MEDIA_TYPE, &code_bytes)?,
            handout: out_dir.to_path_buf(),
        })
    })();
    if written.is_err() {
        let _ = fs::remove_dir_all(out_dir);
    }
    written
}

fn find_suffix<'a>(manifest: &'a FolderManifest, suffix: &str) -> Option<&'a FileEntry> {
    manifest.files.iter().find(|e| e.name.ends_with(suffix))
}

fn fetch(vault: &Vault, entry: &FileEntry) -> Result<Vec<u8>> {
    let content_ref = entry.content_ref.as_ref().ok_or_else(|| CaskError::ContentUnavailable {
        entry: entry.rel_path.clone(),
        content_ref: "none".to_string(),
    })?;
    vault.payload(content_ref)?.ok_or_else(|| CaskError::ContentUnavailable {
        entry: entry.rel_path.clone(),
        content_ref: content_ref.to_string(),
    })
}

fn materialize(
    out_dir: &Path,
    entry: &FileEntry,
    media_type: &'static str,
    bytes: &[u8],
) -> Result<AssetHandle> {
    let path = out_dir.join(&entry.name);
    fs::write(&path, bytes).map_err(|e| CaskError::io(&path, e))?;
    debug!("materialized {} as {} ({} bytes)", entry.rel_path, media_type, bytes.len());
    Ok(AssetHandle {
        rel_path: entry.rel_path.clone(),
        media_type,
        path,
        size: bytes.len() as u64,
    })
}
