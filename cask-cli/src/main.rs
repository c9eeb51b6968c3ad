use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use globset::{Glob, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

use cask_core::bundle::{self, BundleAssets};
use cask_core::localize::Messages;
use cask_core::manifest::{FolderManifest, FolderRef};
use cask_core::preview::{self, Preview};
use cask_core::progress::IngestProgress;
use cask_core::session::SessionBroker;
use cask_core::store::Vault;
use cask_core::walk::{self, DroppedFile, WalkOptions};

#[derive(Parser)]
#[command(name = "cask", version, about = "GameCask: local game-bundle vault")]
struct Cli {
    /// Vault directory
    #[arg(long, default_value = ".gamecask", global = true)]
    vault: PathBuf,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Ingest a folder; prints the new session reference on stdout
    Ingest {
        folder: PathBuf,
        /// Expand the folder to a flat file list first and ingest it by
        /// relative-path hints (the file-picker code path)
        #[arg(long, default_value_t = false)]
        flat: bool,
        #[arg(long)]
        include: Vec<String>,
        #[arg(long)]
        exclude: Vec<String>,
        #[arg(long, default_value_t = false)]
        progress: bool,
    },
    /// Ingest then immediately reconstruct the runtime bundle (drop-to-play)
    Run {
        folder: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        include: Vec<String>,
        #[arg(long)]
        exclude: Vec<String>,
        #[arg(long, default_value_t = false)]
        progress: bool,
    },
    /// List stored sessions, or the entries of one session
    Ls { folder_ref: Option<String> },
    /// Preview one entry of a session
    Show { folder_ref: String, rel_path: String },
    /// Reconstruct the loader/data/framework/wasm quartet for a session
    Bundle {
        folder_ref: String,
        #[arg(long)]
        out: PathBuf,
    },
    /// Re-hash every stored payload against its content reference
    Audit,
    /// Keep only the most recent N sessions
    Prune {
        #[arg(long)]
        keep: usize,
    },
    /// Empty the vault
    Clear,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let loc = Messages::for_lang("en-GB");
    let vault = Vault::open(&cli.vault)?;
    match cli.cmd {
        Cmd::Ingest { folder, flat, include, exclude, progress } => {
            let opts = build_filters(&include, &exclude)?;
            let folder_ref = ingest(&vault, &loc, &folder, flat, &opts, progress)?;
            println!("{folder_ref}");
        }
        Cmd::Run { folder, out, include, exclude, progress } => {
            let opts = build_filters(&include, &exclude)?;
            let folder_ref = ingest(&vault, &loc, &folder, false, &opts, progress)?;
            // The broker carries the fresh reference from the ingestion step
            // to the player step; the player never guesses.
            let broker = SessionBroker::new();
            broker.set_current(folder_ref);
            let current = broker.require_current()?;
            let manifest = load_manifest(&vault, &loc, &current)?;
            let assets = bundle::reconstruct(&vault, &manifest, &out)?;
            print_handles(&assets);
            eprintln!("{}", loc.get("bundle-ready", &[("dir", out.display().to_string())]));
        }
        Cmd::Ls { folder_ref: None } => {
            let sessions = vault.sessions()?;
            if sessions.is_empty() {
                eprintln!("{}", loc.get("no-sessions", &[]));
            }
            for s in sessions {
                println!("{}\t{}\t{} files\t{}", s.folder_ref, s.created_utc, s.files, s.name);
            }
        }
        Cmd::Ls { folder_ref: Some(folder_ref) } => {
            let folder_ref = FolderRef::from(folder_ref);
            let manifest = load_manifest(&vault, &loc, &folder_ref)?;
            for entry in &manifest.files {
                let content = if entry.content_ref.is_some() { "" } else { "\t[no content]" };
                println!("{}\t{}\t{}{}", entry.rel_path, entry.size, entry.media_type, content);
            }
        }
        Cmd::Show { folder_ref, rel_path } => {
            let folder_ref = FolderRef::from(folder_ref);
            let manifest = load_manifest(&vault, &loc, &folder_ref)?;
            let entry = manifest.entry(&rel_path).with_context(|| {
                loc.get(
                    "entry-missing",
                    &[("path", rel_path.clone()), ("ref", folder_ref.to_string())],
                )
            })?;
            match preview::preview(&vault, entry)? {
                Preview::Text { text, .. } => print!("{text}"),
                Preview::Image { rel_path, media_type, bytes } => {
                    println!(
                        "{}",
                        loc.get(
                            "preview-image",
                            &[
                                ("path", rel_path),
                                ("type", media_type),
                                ("size", bytes.len().to_string()),
                            ],
                        )
                    );
                }
                Preview::Metadata { rel_path, media_type, size } => {
                    println!(
                        "{}",
                        loc.get(
                            "preview-metadata",
                            &[
                                ("path", rel_path),
                                ("type", media_type),
                                ("size", size.to_string()),
                            ],
                        )
                    );
                }
                Preview::DecodeFailed { rel_path, reason } => {
                    println!(
                        "{}",
                        loc.get(
                            "preview-decode-failed",
                            &[("path", rel_path), ("reason", reason)],
                        )
                    );
                }
            }
        }
        Cmd::Bundle { folder_ref, out } => {
            let folder_ref = FolderRef::from(folder_ref);
            let manifest = load_manifest(&vault, &loc, &folder_ref)?;
            let assets = bundle::reconstruct(&vault, &manifest, &out)?;
            print_handles(&assets);
            eprintln!("{}", loc.get("bundle-ready", &[("dir", out.display().to_string())]));
        }
        Cmd::Audit => {
            let report = vault.audit()?;
            println!(
                "{}",
                loc.get(
                    "audit-report",
                    &[
                        ("ok", report.payloads_ok.to_string()),
                        ("bad", report.payloads_bad.to_string()),
                        ("manifests", report.manifests.to_string()),
                    ],
                )
            );
            if report.payloads_bad > 0 {
                std::process::exit(1);
            }
        }
        Cmd::Prune { keep } => {
            let report = vault.prune(keep)?;
            println!(
                "{}",
                loc.get(
                    "prune-report",
                    &[
                        ("sessions", report.sessions_removed.to_string()),
                        ("payloads", report.payloads_removed.to_string()),
                    ],
                )
            );
        }
        Cmd::Clear => {
            vault.clear_all()?;
            println!("{}", loc.get("vault-cleared", &[]));
        }
    }
    Ok(())
}

fn build_filters(include: &[String], exclude: &[String]) -> Result<WalkOptions> {
    let mut opts = WalkOptions::default();
    if !include.is_empty() {
        let mut builder = GlobSetBuilder::new();
        for glob in include {
            builder.add(Glob::new(glob)?);
        }
        opts.include = Some(builder.build()?);
    }
    if !exclude.is_empty() {
        let mut builder = GlobSetBuilder::new();
        for glob in exclude {
            builder.add(Glob::new(glob)?);
        }
        opts.exclude = Some(builder.build()?);
    }
    Ok(opts)
}

fn ingest(
    vault: &Vault,
    loc: &Messages,
    folder: &Path,
    flat: bool,
    opts: &WalkOptions,
    show_progress: bool,
) -> Result<FolderRef> {
    let outcome = if flat {
        let files = flatten(folder)?;
        let progress = IngestProgress::exact(files.len());
        if show_progress {
            progress.start_reporter(Duration::from_secs(1));
        }
        let outcome = walk::walk_flat(&files, opts, &progress);
        progress.stop_reporter();
        outcome?
    } else {
        let progress = IngestProgress::estimate();
        if show_progress {
            progress.start_reporter(Duration::from_secs(1));
        }
        let outcome = walk::walk_directory(folder, opts, &progress);
        progress.stop_reporter();
        outcome?
    };
    let folder_ref = FolderRef::generate();
    vault.store_folder_data(&folder_ref, &outcome.manifest, &outcome.payloads)?;
    eprintln!(
        "{}",
        loc.get(
            "ingest-complete",
            &[
                ("files", outcome.manifest.files.len().to_string()),
                ("name", outcome.manifest.name.clone()),
                ("ref", folder_ref.to_string()),
            ],
        )
    );
    Ok(folder_ref)
}

/// Expand a directory into the ordered flat list a file picker would supply,
/// rel-path hints prefixed with the folder name (browser convention).
fn flatten(folder: &Path) -> Result<Vec<DroppedFile>> {
    let root_name = folder
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut files = Vec::new();
    for entry in WalkDir::new(folder).min_depth(1).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = pathdiff::diff_paths(entry.path(), folder)
            .unwrap_or_else(|| entry.path().to_path_buf());
        let rel = rel.to_string_lossy().replace('\\', "/");
        files.push(DroppedFile {
            path: entry.path().to_path_buf(),
            rel_hint: Some(format!("{root_name}/{rel}")),
        });
    }
    Ok(files)
}

fn load_manifest(vault: &Vault, loc: &Messages, folder_ref: &FolderRef) -> Result<FolderManifest> {
    vault
        .manifest(folder_ref)?
        .with_context(|| loc.get("session-missing", &[("ref", folder_ref.to_string())]))
}

fn print_handles(assets: &BundleAssets) {
    for handle in assets.handles() {
        println!("{}\t{}", handle.media_type, handle.path.display());
    }
}
