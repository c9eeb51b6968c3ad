use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crc32fast::Hasher as Crc32;
use fs2::FileExt;
use log::{debug, warn};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use crate::error::{CaskError, Result};
use crate::manifest::{ContentRef, FolderManifest, FolderRef};

/// Payload blob framing: magic + NUL, schema, raw length, CRC32 of the
/// compressed body, then the zstd-compressed bytes.
const BLOB_MAGIC: &[u8] = b"CASKBLB\0"; // 8 bytes
const BLOB_SCHEMA: u32 = 1;
const BLOB_HEADER_LEN: usize = 8 + 4 + 8 + 4;

/// One catalog row per committed ingestion run, newest last.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SessionRecord {
    pub folder_ref: FolderRef,
    pub name: String,
    pub created_utc: String,
    pub files: u64,
    pub payload_refs: Vec<ContentRef>,
}

#[derive(Serialize, Deserialize, Default)]
struct Catalog {
    sessions: Vec<SessionRecord>,
}

#[derive(Debug, Clone)]
pub struct AuditReport {
    pub payloads_ok: u64,
    pub payloads_bad: u64,
    pub manifests: u64,
}

#[derive(Debug, Clone)]
pub struct PruneReport {
    pub sessions_removed: usize,
    pub payloads_removed: usize,
}

/// Durable dual-collection store: manifests by folder reference, payload
/// blobs by content reference, plus a session catalog for listing and
/// retention. Mutations take an exclusive advisory lock so concurrent
/// writers to the same vault serialize (last write wins per key).
pub struct Vault {
    root: PathBuf,
    lock: File,
}

struct WriteGuard<'a>(&'a File);

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        let _ = self.0.unlock();
    }
}

impl Vault {
    /// Open (creating on first use) the vault layout under `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let unavailable = |e: io::Error| CaskError::StorageUnavailable {
            path: root.clone(),
            source: e,
        };
        fs::create_dir_all(root.join("manifests")).map_err(unavailable)?;
        fs::create_dir_all(root.join("payloads")).map_err(unavailable)?;
        let lock = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(root.join("cask.lock"))
            .map_err(unavailable)?;
        Ok(Vault { root, lock })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn write_guard(&self) -> Result<WriteGuard<'_>> {
        self.lock.lock_exclusive().map_err(|e| CaskError::StorageUnavailable {
            path: self.root.clone(),
            source: e,
        })?;
        Ok(WriteGuard(&self.lock))
    }

    fn manifest_path(&self, folder_ref: &FolderRef) -> PathBuf {
        self.root.join("manifests").join(format!("{}.json", folder_ref.as_str()))
    }

    fn payload_path(&self, content_ref: &ContentRef) -> PathBuf {
        self.root.join("payloads").join(format!("{}.blob", content_ref.as_str()))
    }

    fn catalog_path(&self) -> PathBuf {
        self.root.join("catalog.bin")
    }

    /// Upsert one manifest; last write wins.
    pub fn put_manifest(&self, folder_ref: &FolderRef, manifest: &FolderManifest) -> Result<()> {
        let _g = self.write_guard()?;
        self.write_manifest_unlocked(folder_ref, manifest)
    }

    /// Upsert one payload; content-addressed, so an existing blob with the
    /// same reference is already identical and left alone.
    pub fn put_payload(&self, content_ref: &ContentRef, bytes: &[u8]) -> Result<()> {
        let _g = self.write_guard()?;
        self.write_payload_unlocked(content_ref, bytes)
    }

    /// `Ok(None)` when the reference is unknown; errors only on transport
    /// or decode failure.
    pub fn manifest(&self, folder_ref: &FolderRef) -> Result<Option<FolderManifest>> {
        let path = self.manifest_path(folder_ref);
        let raw = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CaskError::io(&path, e)),
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    /// `Ok(None)` when the reference is unknown; a present but damaged blob
    /// is a `CorruptPayload` error, never silently absent.
    pub fn payload(&self, content_ref: &ContentRef) -> Result<Option<Vec<u8>>> {
        let path = self.payload_path(content_ref);
        let raw = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CaskError::io(&path, e)),
        };
        decode_blob(content_ref, &raw).map(Some)
    }

    /// Persist one ingestion run as a unit: every payload first, then the
    /// manifest (the commit point — a session is visible iff its manifest
    /// exists), then the catalog row. On failure the manifest is removed so
    /// no committed session ever references unwritten payloads; stray
    /// payload blobs are orphans that `prune` reclaims.
    pub fn store_folder_data(
        &self,
        folder_ref: &FolderRef,
        manifest: &FolderManifest,
        payloads: &HashMap<ContentRef, Vec<u8>>,
    ) -> Result<()> {
        let _g = self.write_guard()?;
        let commit = (|| -> Result<()> {
            for (content_ref, bytes) in payloads {
                self.write_payload_unlocked(content_ref, bytes)?;
            }
            self.write_manifest_unlocked(folder_ref, manifest)?;
            let mut catalog = self.read_catalog()?;
            catalog.sessions.retain(|s| s.folder_ref != *folder_ref);
            catalog.sessions.push(SessionRecord {
                folder_ref: folder_ref.clone(),
                name: manifest.name.clone(),
                created_utc: manifest.created_utc.clone(),
                files: manifest.files.len() as u64,
                payload_refs: payloads.keys().cloned().collect(),
            });
            self.write_catalog(&catalog)
        })();
        if commit.is_err() {
            let _ = fs::remove_file(self.manifest_path(folder_ref));
        } else {
            debug!(
                "committed session {} ({} entries, {} payloads)",
                folder_ref,
                manifest.files.len(),
                payloads.len()
            );
        }
        commit
    }

    /// Catalog rows, oldest first.
    pub fn sessions(&self) -> Result<Vec<SessionRecord>> {
        Ok(self.read_catalog()?.sessions)
    }

    /// Empty both collections and the catalog.
    pub fn clear_all(&self) -> Result<()> {
        let _g = self.write_guard()?;
        for sub in ["manifests", "payloads"] {
            let dir = self.root.join(sub);
            match fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(CaskError::io(&dir, e)),
            }
            fs::create_dir_all(&dir).map_err(|e| CaskError::io(&dir, e))?;
        }
        let catalog = self.catalog_path();
        match fs::remove_file(&catalog) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CaskError::io(&catalog, e)),
        }
    }

    /// Retention: keep the `keep` most recent sessions, drop older manifests
    /// and any payload no surviving session references.
    pub fn prune(&self, keep: usize) -> Result<PruneReport> {
        let _g = self.write_guard()?;
        let mut catalog = self.read_catalog()?;
        if catalog.sessions.len() <= keep {
            return Ok(PruneReport { sessions_removed: 0, payloads_removed: 0 });
        }
        let cut = catalog.sessions.len() - keep;
        let dropped: Vec<SessionRecord> = catalog.sessions.drain(..cut).collect();
        let live: HashSet<&ContentRef> =
            catalog.sessions.iter().flat_map(|s| s.payload_refs.iter()).collect();
        let mut payloads_removed = 0;
        for session in &dropped {
            let _ = fs::remove_file(self.manifest_path(&session.folder_ref));
            for content_ref in &session.payload_refs {
                if !live.contains(content_ref)
                    && fs::remove_file(self.payload_path(content_ref)).is_ok()
                {
                    payloads_removed += 1;
                }
            }
        }
        self.write_catalog(&catalog)?;
        Ok(PruneReport { sessions_removed: dropped.len(), payloads_removed })
    }

    /// Re-hash every stored payload against its content reference.
    pub fn audit(&self) -> Result<AuditReport> {
        let mut report = AuditReport { payloads_ok: 0, payloads_bad: 0, manifests: 0 };
        let manifests_dir = self.root.join("manifests");
        for ent in fs::read_dir(&manifests_dir).map_err(|e| CaskError::io(&manifests_dir, e))? {
            let path = ent.map_err(|e| CaskError::io(&manifests_dir, e))?.path();
            if path.extension().map(|s| s == "json").unwrap_or(false) {
                report.manifests += 1;
            }
        }
        let payloads_dir = self.root.join("payloads");
        for ent in fs::read_dir(&payloads_dir).map_err(|e| CaskError::io(&payloads_dir, e))? {
            let path = ent.map_err(|e| CaskError::io(&payloads_dir, e))?.path();
            if !path.extension().map(|s| s == "blob").unwrap_or(false) {
                continue;
            }
            let stem = match path.file_stem() {
                Some(s) => s.to_string_lossy().to_string(),
                None => continue,
            };
            let content_ref = ContentRef::from(stem);
            if self.audit_one(&content_ref, &path) {
                report.payloads_ok += 1;
            } else {
                warn!("payload {} failed audit", content_ref);
                report.payloads_bad += 1;
            }
        }
        Ok(report)
    }

    fn audit_one(&self, content_ref: &ContentRef, path: &Path) -> bool {
        let Ok(file) = File::open(path) else { return false };
        let Ok(len) = file.metadata().map(|m| m.len()) else { return false };
        if len < BLOB_HEADER_LEN as u64 {
            return false;
        }
        let Ok(mmap) = (unsafe { Mmap::map(&file) }) else { return false };
        match decode_blob(content_ref, &mmap[..]) {
            Ok(bytes) => ContentRef::for_bytes(&bytes) == *content_ref,
            Err(_) => false,
        }
    }

    fn write_manifest_unlocked(
        &self,
        folder_ref: &FolderRef,
        manifest: &FolderManifest,
    ) -> Result<()> {
        let json = serde_json::to_vec_pretty(manifest)?;
        write_atomic(&self.manifest_path(folder_ref), &json)
    }

    fn write_payload_unlocked(&self, content_ref: &ContentRef, bytes: &[u8]) -> Result<()> {
        let path = self.payload_path(content_ref);
        if path.exists() {
            return Ok(());
        }
        write_atomic(&path, &encode_blob(bytes)?)
    }

    fn read_catalog(&self) -> Result<Catalog> {
        match fs::read(self.catalog_path()) {
            Ok(raw) => Ok(bincode::deserialize(&raw)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Catalog::default()),
            Err(e) => Err(CaskError::io(self.catalog_path(), e)),
        }
    }

    fn write_catalog(&self, catalog: &Catalog) -> Result<()> {
        write_atomic(&self.catalog_path(), &bincode::serialize(catalog)?)
    }
}

/// Atomic with respect to concurrent readers of the same key: write a
/// sibling temp file, then rename over the destination.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|e| CaskError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| CaskError::io(path, e))
}

fn encode_blob(bytes: &[u8]) -> Result<Vec<u8>> {
    let compressed = zstd::stream::encode_all(bytes, 0).map_err(CaskError::Compress)?;
    let mut hasher = Crc32::new();
    hasher.update(&compressed);
    let crc = hasher.finalize();
    let mut out = Vec::with_capacity(BLOB_HEADER_LEN + compressed.len());
    out.extend_from_slice(BLOB_MAGIC);
    out.extend_from_slice(&BLOB_SCHEMA.to_le_bytes());
    out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(&compressed);
    Ok(out)
}

fn decode_blob(content_ref: &ContentRef, raw: &[u8]) -> Result<Vec<u8>> {
    let corrupt = |reason: &str| CaskError::CorruptPayload {
        content_ref: content_ref.to_string(),
        reason: reason.to_string(),
    };
    if raw.len() < BLOB_HEADER_LEN || &raw[..8] != BLOB_MAGIC {
        return Err(corrupt("bad magic"));
    }
    let mut u32buf = [0u8; 4];
    u32buf.copy_from_slice(&raw[8..12]);
    if u32::from_le_bytes(u32buf) != BLOB_SCHEMA {
        return Err(corrupt("unknown schema"));
    }
    let mut u64buf = [0u8; 8];
    u64buf.copy_from_slice(&raw[12..20]);
    let raw_len = u64::from_le_bytes(u64buf);
    u32buf.copy_from_slice(&raw[20..24]);
    let crc = u32::from_le_bytes(u32buf);
    let body = &raw[BLOB_HEADER_LEN..];
    let mut hasher = Crc32::new();
    hasher.update(body);
    if hasher.finalize() != crc {
        return Err(corrupt("crc mismatch"));
    }
    let bytes = zstd::stream::decode_all(body).map_err(|_| corrupt("zstd decode failed"))?;
    if bytes.len() as u64 != raw_len {
        return Err(corrupt("length mismatch"));
    }
    Ok(bytes)
}
