use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use globset::GlobSet;
use log::{debug, warn};
use rayon::prelude::*;

use crate::error::{CaskError, Result};
use crate::manifest::{ContentRef, FileEntry, FolderManifest};
use crate::media;
use crate::progress::IngestProgress;

/// How many children to pull from a directory iterator per fetch. The
/// underlying platform may hand children out piecemeal, so each directory is
/// drained in bounded batches until an empty batch signals exhaustion.
const CHILD_BATCH: usize = 64;

/// Display name when a flat drop carries no relative-path hints.
pub const UNKNOWN_FOLDER: &str = "Unknown Folder";

/// One file handed over in flat mode, with an optional relative-path hint
/// (the drop source's embedded path metadata, root folder name included).
#[derive(Clone, Debug)]
pub struct DroppedFile {
    pub path: PathBuf,
    pub rel_hint: Option<String>,
}

/// A file the walk could not ingest. Non-fatal: its manifest entry is kept
/// without a content reference and traversal continues.
#[derive(Clone, Debug)]
pub struct SkippedFile {
    pub rel_path: String,
    pub reason: String,
}

/// In-memory product of one walk. Persistence is the caller's business.
pub struct WalkOutcome {
    pub manifest: FolderManifest,
    pub payloads: HashMap<ContentRef, Vec<u8>>,
    pub skipped: Vec<SkippedFile>,
}

#[derive(Default)]
pub struct WalkOptions {
    pub include: Option<GlobSet>,
    pub exclude: Option<GlobSet>,
}

impl WalkOptions {
    fn admits(&self, rel_path: &str) -> bool {
        if let Some(inc) = &self.include {
            if !inc.is_match(rel_path) {
                return false;
            }
        }
        if let Some(exc) = &self.exclude {
            if exc.is_match(rel_path) {
                return false;
            }
        }
        true
    }
}

struct Child {
    path: PathBuf,
    rel_path: String,
    is_dir: bool,
}

/// One directory being drained. Holding the iterator in the frame keeps the
/// traversal iterative; deep trees never grow the call stack.
struct Frame {
    rel_prefix: String,
    children: fs::ReadDir,
    pending: VecDeque<Child>,
}

impl Frame {
    fn open(dir: &Path, rel_prefix: String) -> io::Result<Self> {
        Ok(Frame { rel_prefix, children: fs::read_dir(dir)?, pending: VecDeque::new() })
    }

    /// Pull the next bounded batch of children; returns how many the
    /// iterator yielded (zero means this directory is exhausted).
    fn fetch_batch(&mut self, skipped: &mut Vec<SkippedFile>) -> usize {
        let mut fetched = 0;
        for ent in self.children.by_ref().take(CHILD_BATCH) {
            fetched += 1;
            let ent = match ent {
                Ok(e) => e,
                Err(e) => {
                    warn!("unreadable directory entry under {:?}: {}", self.rel_prefix, e);
                    skipped.push(SkippedFile {
                        rel_path: self.rel_prefix.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            let name = ent.file_name().to_string_lossy().to_string();
            let rel_path = format!("{}{}", self.rel_prefix, name);
            let file_type = match ent.file_type() {
                Ok(t) => t,
                Err(e) => {
                    warn!("cannot stat {}: {}", rel_path, e);
                    skipped.push(SkippedFile { rel_path, reason: e.to_string() });
                    continue;
                }
            };
            if file_type.is_symlink() {
                // Not followed, same policy as the store's own tree handling.
                warn!("not following symlink {}", rel_path);
                skipped.push(SkippedFile { rel_path, reason: "symlink".to_string() });
                continue;
            }
            self.pending.push_back(Child {
                path: ent.path(),
                rel_path,
                is_dir: file_type.is_dir(),
            });
        }
        fetched
    }
}

/// Recursive-traversal mode: ingest a whole directory tree.
///
/// Re-expressed as an explicit work-queue: the root frame is pushed, each
/// frame's children are drained in bounded batches, files are read and
/// appended in discovery order, subdirectories push a new frame (depth-first).
pub fn walk_directory(
    root: &Path,
    opts: &WalkOptions,
    progress: &IngestProgress,
) -> Result<WalkOutcome> {
    let meta = fs::metadata(root).map_err(|e| CaskError::io(root, e))?;
    if !meta.is_dir() {
        return Err(CaskError::io(
            root,
            io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
        ));
    }
    let name = root
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| UNKNOWN_FOLDER.to_string());
    let mut manifest = FolderManifest::new(name);
    let mut payloads = HashMap::new();
    let mut skipped = Vec::new();

    let root_frame = Frame::open(root, String::new()).map_err(|e| CaskError::io(root, e))?;
    let mut stack = vec![root_frame];

    loop {
        let Some(top) = stack.last_mut() else { break };
        if top.pending.is_empty() && top.fetch_batch(&mut skipped) == 0 {
            stack.pop();
            continue;
        }
        // Take the run of files at the front of the queue, stopping at the
        // first subdirectory so expansion stays depth-first.
        let mut run = Vec::new();
        let mut next_dir = None;
        while let Some(child) = top.pending.pop_front() {
            if child.is_dir {
                next_dir = Some(child);
                break;
            }
            run.push(child);
        }
        ingest_run(&run, opts, progress, &mut manifest, &mut payloads, &mut skipped);
        if let Some(dir) = next_dir {
            match Frame::open(&dir.path, format!("{}/", dir.rel_path)) {
                Ok(frame) => stack.push(frame),
                Err(e) => {
                    warn!("skipping unreadable directory {}: {}", dir.rel_path, e);
                    skipped.push(SkippedFile { rel_path: dir.rel_path, reason: e.to_string() });
                }
            }
        }
    }

    progress.finish();
    debug!(
        "walked {:?}: {} entries, {} skipped",
        manifest.name,
        manifest.files.len(),
        skipped.len()
    );
    Ok(WalkOutcome { manifest, payloads, skipped })
}

/// Flat-file mode: the drop source supplied an ordered file list instead of
/// a directory handle. The folder display name comes from the first hint's
/// leading path component.
pub fn walk_flat(
    files: &[DroppedFile],
    opts: &WalkOptions,
    progress: &IngestProgress,
) -> Result<WalkOutcome> {
    let name = files
        .first()
        .and_then(|f| f.rel_hint.as_deref())
        .and_then(|h| h.split('/').next())
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_FOLDER)
        .to_string();
    let mut manifest = FolderManifest::new(name);
    let mut payloads = HashMap::new();
    let mut skipped = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for file in files {
        let rel_path = flat_rel_path(file);
        if !opts.admits(&rel_path) {
            progress.file_done(0);
            continue;
        }
        if !seen.insert(rel_path.clone()) {
            warn!("duplicate relative path {} in flat drop, keeping the first", rel_path);
            skipped.push(SkippedFile { rel_path, reason: "duplicate relative path".to_string() });
            progress.file_done(0);
            continue;
        }
        let read = fs::read(&file.path);
        push_entry(&file.path, &rel_path, read, progress, &mut manifest, &mut payloads, &mut skipped);
    }

    progress.finish();
    Ok(WalkOutcome { manifest, payloads, skipped })
}

/// Relative path for one flat-mode file: strip the leading (folder-name)
/// component off the hint, or fall back to the bare file name.
fn flat_rel_path(file: &DroppedFile) -> String {
    match file.rel_hint.as_deref() {
        Some(hint) => match hint.split_once('/') {
            Some((_, rest)) if !rest.is_empty() => rest.to_string(),
            _ => hint.to_string(),
        },
        None => file
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file.path.to_string_lossy().to_string()),
    }
}

fn ingest_run(
    run: &[Child],
    opts: &WalkOptions,
    progress: &IngestProgress,
    manifest: &mut FolderManifest,
    payloads: &mut HashMap<ContentRef, Vec<u8>>,
    skipped: &mut Vec<SkippedFile>,
) {
    let admitted: Vec<&Child> = run.iter().filter(|c| opts.admits(&c.rel_path)).collect();
    if admitted.is_empty() {
        return;
    }
    progress.add_discovered(admitted.len());
    // Reads within one batch run concurrently; rayon's indexed collect
    // preserves order, so the manifest keeps discovery order even when the
    // reads themselves complete out of order.
    let reads: Vec<io::Result<Vec<u8>>> =
        admitted.par_iter().map(|c| fs::read(&c.path)).collect();
    for (child, read) in admitted.iter().zip(reads) {
        push_entry(&child.path, &child.rel_path, read, progress, manifest, payloads, skipped);
    }
}

fn push_entry(
    path: &Path,
    rel_path: &str,
    read: io::Result<Vec<u8>>,
    progress: &IngestProgress,
    manifest: &mut FolderManifest,
    payloads: &mut HashMap<ContentRef, Vec<u8>>,
    skipped: &mut Vec<SkippedFile>,
) {
    let name = rel_path.rsplit('/').next().unwrap_or(rel_path).to_string();
    let media_type = media::media_type_for(&name).to_string();
    match read {
        Ok(bytes) => {
            let size = bytes.len() as u64;
            let content_ref = ContentRef::for_bytes(&bytes);
            payloads.entry(content_ref.clone()).or_insert(bytes);
            manifest.files.push(FileEntry {
                name,
                rel_path: rel_path.to_string(),
                media_type,
                size,
                content_ref: Some(content_ref),
            });
            progress.file_done(size as usize);
        }
        Err(e) => {
            // Read failure is non-fatal: keep the entry content-less and
            // carry on with the rest of the walk.
            warn!("skipping unreadable file {}: {}", rel_path, e);
            let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            manifest.files.push(FileEntry {
                name,
                rel_path: rel_path.to_string(),
                media_type,
                size,
                content_ref: None,
            });
            skipped.push(SkippedFile { rel_path: rel_path.to_string(), reason: e.to_string() });
            progress.file_done(0);
        }
    }
}
