//! End-to-end backup and restore scenarios against an in-memory store.

use std::fs;
use std::path::Path;
use std::time::Duration;

use sigvault_core::archive::ArchiveWriter;
use sigvault_core::commands::{backup, restore};
use sigvault_core::config::EngineConfig;
use sigvault_core::names;
use sigvault_core::snapshot::tree_hash_of;
use sigvault_core::storage::{BlobStore, MemoryStore};
use sigvault_core::walker::IgnoreWalker;

fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
    for (rel, contents) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }
}

// State records carry second-precision timestamps, so consecutive
// backup runs need a real clock tick between them.
fn tick() {
    std::thread::sleep(Duration::from_millis(1100));
}

#[test]
fn multi_volume_full_backup_restores_whole_tree() {
    let src = tempfile::tempdir().unwrap();
    write_tree(
        src.path(),
        &[
            ("big/a.bin", vec![0xAAu8; 512].as_slice()),
            ("big/b.bin", vec![0xBBu8; 512].as_slice()),
            ("big/c.bin", vec![0xCCu8; 512].as_slice()),
            ("small.txt", b"tiny".as_slice()),
        ],
    );

    let store = MemoryStore::new();
    let mut config = EngineConfig::default();
    config.volume_size_limit = 600;
    let walker = IgnoreWalker::default();

    let outcome = backup::full(&config, &store, "vols", src.path(), &walker).unwrap();
    assert!(outcome.archives.len() > 1, "expected a split volume set");

    let dest = tempfile::tempdir().unwrap();
    let report = restore::run(&store, "vols", dest.path(), &walker).unwrap();
    assert!(report.is_clean());
    assert!(report.steps.is_empty());

    assert_eq!(
        tree_hash_of(dest.path(), &walker).unwrap(),
        tree_hash_of(src.path(), &walker).unwrap()
    );
    assert_eq!(fs::read(dest.path().join("big/b.bin")).unwrap(), vec![0xBBu8; 512]);
}

#[test]
fn restore_after_no_change_incremental_is_clean() {
    let src = tempfile::tempdir().unwrap();
    write_tree(src.path(), &[("doc.txt", b"steady state".as_slice())]);

    let store = MemoryStore::new();
    let config = EngineConfig::default();
    let walker = IgnoreWalker::default();

    backup::full(&config, &store, "idle", src.path(), &walker).unwrap();
    tick();
    let outcome = backup::incremental(&config, &store, "idle", src.path(), &walker).unwrap();
    assert!(outcome.created_archive.is_none());
    assert!(outcome.updated_archive.is_none());

    let dest = tempfile::tempdir().unwrap();
    let report = restore::run(&store, "idle", dest.path(), &walker).unwrap();
    assert!(report.is_clean(), "report: {report:?}");
    assert_eq!(report.steps.len(), 1);

    assert_eq!(
        tree_hash_of(dest.path(), &walker).unwrap(),
        tree_hash_of(src.path(), &walker).unwrap()
    );
}

#[test]
fn damaged_delta_archive_fails_only_that_file() {
    let src = tempfile::tempdir().unwrap();
    write_tree(
        src.path(),
        &[
            ("edited.txt", b"original contents of the edited file".as_slice()),
            ("doomed.txt", b"soon deleted".as_slice()),
        ],
    );

    let store = MemoryStore::new();
    let mut config = EngineConfig::default();
    config.block_size = 8;
    let walker = IgnoreWalker::default();

    backup::full(&config, &store, "dmg", src.path(), &walker).unwrap();
    tick();

    fs::write(
        src.path().join("edited.txt"),
        b"replaced contents of the edited file",
    )
    .unwrap();
    fs::remove_file(src.path().join("doomed.txt")).unwrap();
    write_tree(src.path(), &[("fresh.txt", b"brand new".as_slice())]);

    let outcome = backup::incremental(&config, &store, "dmg", src.path(), &walker).unwrap();
    let updated_name = outcome.updated_archive.expect("delta archive expected");

    // Damage the incremental: replace the delta archive with an empty
    // container, so the updated file's entry is gone.
    let empty = ArchiveWriter::new().finish().unwrap();
    store.put(&updated_name, &empty).unwrap();
    assert!(store
        .exists(&names::updated_archive_name("dmg", &outcome.ts))
        .unwrap());

    let dest = tempfile::tempdir().unwrap();
    let report = restore::run(&store, "dmg", dest.path(), &walker).unwrap();

    assert!(!report.is_clean());
    let failures = &report.steps[0].report.failures;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].path, "edited.txt");

    // Creations and deletions still went through.
    assert_eq!(fs::read(dest.path().join("fresh.txt")).unwrap(), b"brand new");
    assert!(!dest.path().join("doomed.txt").exists());
    // The failed file keeps its pre-incremental contents.
    assert_eq!(
        fs::read(dest.path().join("edited.txt")).unwrap(),
        b"original contents of the edited file"
    );
}

#[test]
fn second_full_backup_starts_a_new_chain() {
    let src = tempfile::tempdir().unwrap();
    write_tree(src.path(), &[("a.txt", b"first era".as_slice())]);

    let store = MemoryStore::new();
    let config = EngineConfig::default();
    let walker = IgnoreWalker::default();

    backup::full(&config, &store, "era", src.path(), &walker).unwrap();
    tick();

    fs::write(src.path().join("a.txt"), b"second era").unwrap();
    write_tree(src.path(), &[("b.txt", b"also new".as_slice())]);
    let second = backup::full(&config, &store, "era", src.path(), &walker).unwrap();

    let dest = tempfile::tempdir().unwrap();
    let report = restore::run(&store, "era", dest.path(), &walker).unwrap();
    assert!(report.is_clean());
    assert_eq!(report.full_ts, second.ts);
    assert!(report.steps.is_empty());
    assert_eq!(fs::read(dest.path().join("a.txt")).unwrap(), b"second era");
}
