use std::fs;
use std::path::Path;

use cask_core::bundle;
use cask_core::error::CaskError;
use cask_core::manifest::{FolderManifest, FolderRef};
use cask_core::progress::IngestProgress;
use cask_core::store::Vault;
use cask_core::walk::{self, WalkOptions};

fn ingest_bundle(base: &Path, with_wasm: bool) -> (Vault, FolderRef, FolderManifest) {
    let root = base.join("CatEscape");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("Game.loader.js"), b"loader-js").unwrap();
    fs::write(root.join("Game.data"), b"\x00\x01data-blob").unwrap();
    fs::write(root.join("Game.framework.js"), b"framework-js").unwrap();
    if with_wasm {
        fs::write(root.join("Game.wasm"), b"\x00asm-module").unwrap();
    }
    let outcome =
        walk::walk_directory(&root, &WalkOptions::default(), &IngestProgress::estimate()).unwrap();
    let vault = Vault::open(base.join("vault")).unwrap();
    let folder_ref = FolderRef::generate();
    vault.store_folder_data(&folder_ref, &outcome.manifest, &outcome.payloads).unwrap();
    let manifest = vault.manifest(&folder_ref).unwrap().unwrap();
    (vault, folder_ref, manifest)
}

#[test]
fn full_quartet_reconstructs_with_documented_media_types() {
    let td = tempfile::tempdir().unwrap();
    let (vault, _, manifest) = ingest_bundle(td.path(), true);

    let out = td.path().join("handout");
    let assets = bundle::reconstruct(&vault, &manifest, &out).unwrap();
    assert_eq!(assets.loader.media_type, "text/javascript");
    assert_eq!(assets.data.media_type, "application/octet-stream");
    assert_eq!(assets.framework.media_type, "text/javascript");
    assert_eq!(assets.code.media_type, "application/wasm");
    assert_eq!(assets.handles().len(), 4);

    assert_eq!(fs::read(&assets.loader.path).unwrap(), b"loader-js");
    assert_eq!(fs::read(&assets.data.path).unwrap(), b"\x00\x01data-blob");
    assert_eq!(fs::read(&assets.framework.path).unwrap(), b"framework-js");
    assert_eq!(fs::read(&assets.code.path).unwrap(), b"\x00asm-module");

    assets.release().unwrap();
    assert!(!out.exists());
}

#[test]
fn missing_wasm_names_the_suffix_and_produces_nothing() {
    let td = tempfile::tempdir().unwrap();
    let (vault, _, manifest) = ingest_bundle(td.path(), false);

    let out = td.path().join("handout");
    let err = bundle::reconstruct(&vault, &manifest, &out).unwrap_err();
    match err {
        CaskError::MissingBundleAsset { missing } => assert_eq!(missing, vec![".wasm"]),
        other => panic!("expected MissingBundleAsset, got {other:?}"),
    }
    assert!(!out.exists());
}

#[test]
fn occupied_handout_directory_is_refused_and_left_alone() {
    let td = tempfile::tempdir().unwrap();
    let (vault, _, manifest) = ingest_bundle(td.path(), true);

    let out = td.path().join("occupied");
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("precious.txt"), b"do not touch").unwrap();

    let err = bundle::reconstruct(&vault, &manifest, &out).unwrap_err();
    assert!(matches!(err, CaskError::Io { .. }), "got {err:?}");
    // Nothing written, nothing removed.
    assert_eq!(fs::read(out.join("precious.txt")).unwrap(), b"do not touch");
    assert!(!out.join("Game.wasm").exists());
}

#[test]
fn lost_payload_fails_before_materializing() {
    let td = tempfile::tempdir().unwrap();
    let (vault, _, manifest) = ingest_bundle(td.path(), true);
    // Wipe the payload collection while keeping the manifest in hand.
    vault.clear_all().unwrap();

    let out = td.path().join("handout");
    let err = bundle::reconstruct(&vault, &manifest, &out).unwrap_err();
    match err {
        CaskError::ContentUnavailable { entry, .. } => assert_eq!(entry, "Game.loader.js"),
        other => panic!("expected ContentUnavailable, got {other:?}"),
    }
    assert!(!out.exists());
}
