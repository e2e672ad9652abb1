//! Chain restore: resolve the latest full backup plus following
//! incrementals and replay them into a destination tree.

use std::path::Path;

use crate::chain::{self, RestoreReport};
use crate::error::Result;
use crate::storage::BlobStore;
use crate::walker::DirectoryWalker;

/// Restore the newest chain for `key` into `dest`.
///
/// The returned report embeds any per-file failures and the integrity
/// outcome of every incremental step; callers must inspect it even on
/// `Ok`.
pub fn run(
    store: &dyn BlobStore,
    key: &str,
    dest: &Path,
    walker: &dyn DirectoryWalker,
) -> Result<RestoreReport> {
    let chain = chain::resolve(key, store)?;
    chain.restore(store, dest, walker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::backup;
    use crate::config::EngineConfig;
    use crate::snapshot::tree_hash_of;
    use crate::storage::{BlobStore, MemoryStore};
    use crate::walker::IgnoreWalker;
    use std::fs;

    fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
        for (rel, contents) in files {
            let path = root.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, contents).unwrap();
        }
    }

    #[test]
    fn full_then_incremental_then_restore() {
        let src = tempfile::tempdir().unwrap();
        write_tree(
            src.path(),
            &[
                ("file1", b"v1 of file one, long enough to span blocks".as_slice()),
                ("dir/file2", b"file two".as_slice()),
            ],
        );

        let store = MemoryStore::new();
        let mut config = EngineConfig::default();
        config.block_size = 8;
        let walker = IgnoreWalker::default();

        backup::full(&config, &store, "k", src.path(), &walker).unwrap();

        // Mutate: update file1, delete dir/file2, create file3.
        fs::write(
            src.path().join("file1"),
            b"v2 of file one, long enough to span blocks",
        )
        .unwrap();
        fs::remove_file(src.path().join("dir/file2")).unwrap();
        fs::remove_dir(src.path().join("dir")).unwrap();
        write_tree(src.path(), &[("file3", b"new file".as_slice())]);

        // State records carry second-precision timestamps.
        std::thread::sleep(std::time::Duration::from_millis(1100));
        backup::incremental(&config, &store, "k", src.path(), &walker).unwrap();

        let dest = tempfile::tempdir().unwrap();
        let report = run(&store, "k", dest.path(), &walker).unwrap();
        assert!(report.is_clean(), "restore report: {report:?}");

        assert_eq!(
            tree_hash_of(dest.path(), &walker).unwrap(),
            tree_hash_of(src.path(), &walker).unwrap()
        );
        assert_eq!(
            fs::read(dest.path().join("file1")).unwrap(),
            b"v2 of file one, long enough to span blocks"
        );
        assert!(!dest.path().join("dir").exists());
        assert_eq!(fs::read(dest.path().join("file3")).unwrap(), b"new file");
    }

    #[test]
    fn tampered_full_archive_is_reported() {
        let src = tempfile::tempdir().unwrap();
        write_tree(src.path(), &[("file1", b"trusted contents".as_slice())]);

        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let walker = IgnoreWalker::default();
        let outcome = backup::full(&config, &store, "k", src.path(), &walker).unwrap();

        // Swap the stored full archive for one packed from an altered tree.
        let tampered = tempfile::tempdir().unwrap();
        write_tree(tampered.path(), &[("file1", b"tampered contents".as_slice())]);
        let payload = crate::archive::pack_tree(tampered.path(), &walker).unwrap();
        store.put(&outcome.archives[0], &payload).unwrap();

        let dest = tempfile::tempdir().unwrap();
        let report = run(&store, "k", dest.path(), &walker).unwrap();
        assert!(report.steps.is_empty());
        assert!(!report.is_clean());
        assert!(matches!(
            report.full_integrity,
            crate::archive::IntegrityOutcome::Mismatch { .. }
        ));
    }
}
