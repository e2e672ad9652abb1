//! Full and incremental backup operations.

use std::fs;
use std::path::Path;

use tracing::info;

use crate::archive;
use crate::config::EngineConfig;
use crate::diff::{ChangeSet, SnapshotDiff};
use crate::error::{Result, SigvaultError};
use crate::names;
use crate::snapshot::Snapshot;
use crate::storage::BlobStore;
use crate::volume::VolumeWriter;
use crate::walker::DirectoryWalker;

/// Artifacts produced by a full backup run.
#[derive(Debug, Clone)]
pub struct FullBackupOutcome {
    pub ts: String,
    pub state_record: String,
    /// Archive blob names: a single `.tgz`, or the volumes of a split set.
    pub archives: Vec<String>,
}

/// Artifacts produced by an incremental backup run.
#[derive(Debug, Clone)]
pub struct IncrementalBackupOutcome {
    pub ts: String,
    pub state_record: String,
    /// Absent when no files were created since the previous snapshot.
    pub created_archive: Option<String>,
    /// Absent when no files were updated since the previous snapshot.
    pub updated_archive: Option<String>,
    pub changes: ChangeSet,
}

/// Snapshot the tree and store a complete archive of it.
///
/// Trees whose total file size exceeds the configured volume limit are
/// written as a volume set, one entry per file; smaller trees become a
/// single `{key}.full.{ts}.tgz` blob.
pub fn full(
    config: &EngineConfig,
    store: &dyn BlobStore,
    key: &str,
    root: &Path,
    walker: &dyn DirectoryWalker,
) -> Result<FullBackupOutcome> {
    let snapshot = Snapshot::capture(key, root, walker, config)?;
    let ts = snapshot.ts();

    let total_size: u64 = snapshot
        .signatures
        .values()
        .map(|sig| sig.file_length)
        .sum();

    let archives = if total_size > config.volume_size_limit {
        let archive_key = names::full_archive_key(key, &ts);
        let mut writer = VolumeWriter::create(store, archive_key, config.volume_size_limit);
        for dir in &snapshot.subdirs {
            writer.add_dir(dir)?;
        }
        for rel in &snapshot.files {
            let data = fs::read(root.join(rel))?;
            writer.add(rel, &data)?;
        }
        let index = writer.close()?;
        index.volumes.clone()
    } else {
        let payload = archive::pack_tree(root, walker)?;
        let name = names::full_archive_name(key, &ts);
        store.put(&name, &payload)?;
        vec![name]
    };

    let state_record = snapshot.persist(store)?;
    info!(key, ts = %ts, archives = archives.len(), "full backup complete");

    Ok(FullBackupOutcome {
        ts,
        state_record,
        archives,
    })
}

/// Snapshot the tree and store only what changed since the last state
/// record: created files' bytes and updated files' deltas.
pub fn incremental(
    config: &EngineConfig,
    store: &dyn BlobStore,
    key: &str,
    root: &Path,
    walker: &dyn DirectoryWalker,
) -> Result<IncrementalBackupOutcome> {
    let previous = latest_state(store, key)?
        .ok_or_else(|| SigvaultError::SnapshotNotFound(key.to_string()))?;

    let snapshot = Snapshot::capture(key, root, walker, config)?;
    let ts = snapshot.ts();
    let diff = SnapshotDiff::compute(&snapshot, &previous, root)?;

    let created_archive = if diff.changes.created.is_empty() {
        None
    } else {
        let payload = archive::pack_created(&diff.changes, root)?;
        let name = names::created_archive_name(key, &ts);
        store.put(&name, &payload)?;
        Some(name)
    };

    let updated_archive = if diff.deltas.is_empty() {
        None
    } else {
        let payload = archive::pack_updated(&diff.deltas)?;
        let name = names::updated_archive_name(key, &ts);
        store.put(&name, &payload)?;
        Some(name)
    };

    let state_record = snapshot.persist(store)?;
    info!(
        key,
        ts = %ts,
        created = diff.changes.created.len(),
        updated = diff.changes.updated.len(),
        deleted = diff.changes.deleted.len(),
        "incremental backup complete"
    );

    Ok(IncrementalBackupOutcome {
        ts,
        state_record,
        created_archive,
        updated_archive,
        changes: diff.changes,
    })
}

/// Load the most recent persisted snapshot record for `key`, if any.
pub fn latest_state(store: &dyn BlobStore, key: &str) -> Result<Option<Snapshot>> {
    let mut best: Option<String> = None;
    for name in store.list(&names::state_record_prefix(key))? {
        if let Some(ts) = names::ts_of_state_record(key, &name) {
            names::parse_ts(&ts)?;
            if best.as_deref().is_none_or(|b| ts.as_str() > b) {
                best = Some(ts);
            }
        }
    }
    match best {
        Some(ts) => Snapshot::load(store, &names::state_record_name(key, &ts)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::walker::IgnoreWalker;

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
    fn full_backup_small_tree_is_single_archive() {
        let tmp = tempfile::tempdir().unwrap();
        write_tree(tmp.path(), &[("file1", b"one".as_slice())]);
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let walker = IgnoreWalker::default();

        let outcome = full(&config, &store, "k", tmp.path(), &walker).unwrap();
        assert_eq!(outcome.archives.len(), 1);
        assert!(outcome.archives[0].ends_with(".tgz"));
        assert!(store.exists(&outcome.archives[0]).unwrap());
        assert!(store.exists(&outcome.state_record).unwrap());
    }

    #[test]
    fn full_backup_large_tree_splits_into_volumes() {
        let tmp = tempfile::tempdir().unwrap();
        write_tree(
            tmp.path(),
            &[
                ("a", vec![1u8; 300].as_slice()),
                ("b", vec![2u8; 300].as_slice()),
                ("c", vec![3u8; 300].as_slice()),
            ],
        );
        let store = MemoryStore::new();
        let mut config = EngineConfig::default();
        config.volume_size_limit = 400;
        let walker = IgnoreWalker::default();

        let outcome = full(&config, &store, "k", tmp.path(), &walker).unwrap();
        assert!(outcome.archives.len() > 1);
        for name in &outcome.archives {
            assert!(name.contains(".vol"));
        }
    }

    #[test]
    fn incremental_requires_previous_state() {
        let tmp = tempfile::tempdir().unwrap();
        write_tree(tmp.path(), &[("file1", b"one".as_slice())]);
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let walker = IgnoreWalker::default();

        assert!(matches!(
            incremental(&config, &store, "k", tmp.path(), &walker).unwrap_err(),
            SigvaultError::SnapshotNotFound(_)
        ));
    }

    #[test]
    fn incremental_with_no_changes_writes_no_archives() {
        let tmp = tempfile::tempdir().unwrap();
        write_tree(tmp.path(), &[("file1", b"one".as_slice())]);
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let walker = IgnoreWalker::default();

        full(&config, &store, "k", tmp.path(), &walker).unwrap();
        let outcome = incremental(&config, &store, "k", tmp.path(), &walker).unwrap();
        assert!(outcome.created_archive.is_none());
        assert!(outcome.updated_archive.is_none());
        assert!(outcome.changes.is_empty());
    }
}
