use std::collections::HashSet;
use std::fs;

use globset::{Glob, GlobSetBuilder};

use cask_core::manifest::FolderRef;
use cask_core::media;
use cask_core::progress::IngestProgress;
use cask_core::store::Vault;
use cask_core::walk::{self, DroppedFile, WalkOptions};

#[test]
fn demo_folder_round_trips_through_the_vault() {
    let td = tempfile::tempdir().unwrap();
    let root = td.path().join("Demo");
    fs::create_dir_all(root.join("sub")).unwrap();
    fs::write(root.join("a.txt"), b"hello").unwrap();
    fs::write(root.join("sub").join("b.png"), b"0123456789").unwrap();

    let progress = IngestProgress::estimate();
    let outcome = walk::walk_directory(&root, &WalkOptions::default(), &progress).unwrap();
    assert_eq!(outcome.manifest.name, "Demo");
    assert_eq!(outcome.manifest.files.len(), 2);
    assert!(outcome.skipped.is_empty());
    assert_eq!(progress.fraction(), 1.0);

    let a = outcome.manifest.entry("a.txt").unwrap();
    assert_eq!(a.size, 5);
    assert_eq!(a.media_type, "text/plain");
    let b = outcome.manifest.entry("sub/b.png").unwrap();
    assert_eq!(b.size, 10);
    assert_eq!(b.media_type, "image/png");

    let vault = Vault::open(td.path().join("vault")).unwrap();
    let folder_ref = FolderRef::generate();
    vault.store_folder_data(&folder_ref, &outcome.manifest, &outcome.payloads).unwrap();
    drop(vault);

    // Reopen: payloads must come back byte-identical.
    let vault = Vault::open(td.path().join("vault")).unwrap();
    let stored = vault.manifest(&folder_ref).unwrap().unwrap();
    let a_ref = stored.entry("a.txt").unwrap().content_ref.clone().unwrap();
    assert_eq!(vault.payload(&a_ref).unwrap().unwrap(), b"hello");
    let b_ref = stored.entry("sub/b.png").unwrap().content_ref.clone().unwrap();
    assert_eq!(vault.payload(&b_ref).unwrap().unwrap(), b"0123456789");
}

#[test]
fn deep_tree_yields_one_entry_per_file_with_unique_paths() {
    let td = tempfile::tempdir().unwrap();
    let root = td.path().join("deep");
    let mut dir = root.clone();
    let mut prefix = String::new();
    let mut expected = HashSet::new();
    for depth in 0..60usize {
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("f{depth}.bin")), vec![depth as u8; depth + 1]).unwrap();
        expected.insert(format!("{prefix}f{depth}.bin"));
        dir = dir.join(format!("d{depth}"));
        prefix = format!("{prefix}d{depth}/");
    }

    let progress = IngestProgress::estimate();
    let outcome = walk::walk_directory(&root, &WalkOptions::default(), &progress).unwrap();
    assert_eq!(outcome.manifest.files.len(), 60);
    let paths: HashSet<String> =
        outcome.manifest.files.iter().map(|e| e.rel_path.clone()).collect();
    assert_eq!(paths, expected);
    for entry in &outcome.manifest.files {
        let content_ref = entry.content_ref.as_ref().unwrap();
        assert!(outcome.payloads.contains_key(content_ref));
    }
    assert_eq!(progress.files_done(), 60);
}

#[test]
fn large_directory_keeps_discovery_order_across_batches() {
    let td = tempfile::tempdir().unwrap();
    let root = td.path().join("wide");
    fs::create_dir_all(&root).unwrap();
    // Well past one child batch, so the loop drains the directory iterator
    // several times and the concurrent reads span multiple runs.
    for i in 0..200usize {
        fs::write(root.join(format!("f{i:03}.bin")), i.to_le_bytes()).unwrap();
    }
    let discovery: Vec<String> = fs::read_dir(&root)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();

    let progress = IngestProgress::estimate();
    let outcome = walk::walk_directory(&root, &WalkOptions::default(), &progress).unwrap();
    assert_eq!(outcome.manifest.files.len(), 200);
    let paths: Vec<String> = outcome.manifest.files.iter().map(|e| e.rel_path.clone()).collect();
    // Manifest order must equal the platform's read-dir order, not sorted
    // order and not read-completion order.
    assert_eq!(paths, discovery);
    let unique: HashSet<&String> = paths.iter().collect();
    assert_eq!(unique.len(), 200);
    assert_eq!(progress.files_done(), 200);
}

#[test]
fn flat_mode_derives_folder_name_and_rel_paths_from_hints() {
    let td = tempfile::tempdir().unwrap();
    fs::write(td.path().join("a.txt"), b"aaaaa").unwrap();
    fs::write(td.path().join("b.png"), b"bbbbbbbbbb").unwrap();
    fs::write(td.path().join("c.dat"), b"cc").unwrap();

    let files = vec![
        DroppedFile { path: td.path().join("a.txt"), rel_hint: Some("Demo/a.txt".to_string()) },
        DroppedFile {
            path: td.path().join("b.png"),
            rel_hint: Some("Demo/sub/b.png".to_string()),
        },
        DroppedFile { path: td.path().join("c.dat"), rel_hint: None },
    ];
    let progress = IngestProgress::exact(files.len());
    let outcome = walk::walk_flat(&files, &WalkOptions::default(), &progress).unwrap();

    assert_eq!(outcome.manifest.name, "Demo");
    let paths: Vec<&str> = outcome.manifest.files.iter().map(|e| e.rel_path.as_str()).collect();
    // Flat mode preserves the supplied order.
    assert_eq!(paths, ["a.txt", "sub/b.png", "c.dat"]);
    assert_eq!(progress.fraction(), 1.0);
}

#[test]
fn flat_mode_without_hints_uses_placeholder_name() {
    let progress = IngestProgress::exact(0);
    let outcome = walk::walk_flat(&[], &WalkOptions::default(), &progress).unwrap();
    assert_eq!(outcome.manifest.name, "Unknown Folder");
    assert!(outcome.manifest.files.is_empty());
    assert_eq!(progress.fraction(), 1.0);
}

#[test]
fn unreadable_file_keeps_entry_without_content() {
    let td = tempfile::tempdir().unwrap();
    fs::write(td.path().join("good.txt"), b"fine").unwrap();
    let files = vec![
        DroppedFile {
            path: td.path().join("good.txt"),
            rel_hint: Some("Drop/good.txt".to_string()),
        },
        DroppedFile {
            path: td.path().join("missing.txt"),
            rel_hint: Some("Drop/missing.txt".to_string()),
        },
    ];
    let progress = IngestProgress::exact(files.len());
    let outcome = walk::walk_flat(&files, &WalkOptions::default(), &progress).unwrap();

    assert_eq!(outcome.manifest.files.len(), 2);
    assert!(outcome.manifest.entry("good.txt").unwrap().content_ref.is_some());
    assert!(outcome.manifest.entry("missing.txt").unwrap().content_ref.is_none());
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].rel_path, "missing.txt");
    // Failed reads still count toward completion.
    assert_eq!(progress.fraction(), 1.0);
}

#[test]
fn exclude_globs_filter_entries() {
    let td = tempfile::tempdir().unwrap();
    let root = td.path().join("drop");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("keep.txt"), b"keep").unwrap();
    fs::write(root.join("skip.log"), b"skip").unwrap();

    let mut builder = GlobSetBuilder::new();
    builder.add(Glob::new("*.log").unwrap());
    let opts = WalkOptions { include: None, exclude: Some(builder.build().unwrap()) };
    let outcome = walk::walk_directory(&root, &opts, &IngestProgress::estimate()).unwrap();
    assert_eq!(outcome.manifest.files.len(), 1);
    assert_eq!(outcome.manifest.files[0].rel_path, "keep.txt");
}

#[test]
fn identical_contents_share_one_payload() {
    let td = tempfile::tempdir().unwrap();
    let root = td.path().join("dup");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("x.bin"), b"same bytes").unwrap();
    fs::write(root.join("y.bin"), b"same bytes").unwrap();

    let outcome =
        walk::walk_directory(&root, &WalkOptions::default(), &IngestProgress::estimate()).unwrap();
    assert_eq!(outcome.manifest.files.len(), 2);
    assert_eq!(outcome.payloads.len(), 1);
    let refs: Vec<_> = outcome.manifest.files.iter().map(|e| e.content_ref.clone()).collect();
    assert_eq!(refs[0], refs[1]);
}

#[test]
fn media_types_follow_extension_convention() {
    assert_eq!(media::media_type_for("Game.loader.js"), "text/javascript");
    assert_eq!(media::media_type_for("Game.wasm"), "application/wasm");
    assert_eq!(media::media_type_for("Game.data"), "application/octet-stream");
    assert_eq!(media::media_type_for("index.html"), "text/html");
    assert_eq!(media::media_type_for("README"), "");
    assert!(media::is_textual("application/json"));
    assert!(media::is_image("image/png"));
    assert!(!media::is_textual("application/wasm"));
}
