//! One full scan of a directory tree: files, subdirectories, per-file
//! block signatures, and the whole-tree hash used for post-restore
//! verification.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sigvault_types::StrongHash;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::names;
use crate::signature::{hash_stream, read_block, Block, BlockSignature, RollingChecksum};
use crate::storage::BlobStore;
use crate::walker::DirectoryWalker;

/// Immutable record of a tree's state at one point in time.
///
/// `signatures` is keyed exactly by `files`; `tree_hash` aggregates the
/// sorted `(path, content hash)` pairs so two trees with identical
/// contents always hash the same, regardless of scan order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub key: String,
    pub time: DateTime<Utc>,
    pub files: BTreeSet<String>,
    pub subdirs: BTreeSet<String>,
    pub signatures: BTreeMap<String, BlockSignature>,
    pub tree_hash: StrongHash,
}

impl Snapshot {
    /// Scan `root` through the walker, computing each file's block
    /// signature and the whole-tree hash. Per-file work runs in
    /// parallel; results land in keyed maps so completion order never
    /// affects the output.
    pub fn capture(
        key: &str,
        root: &Path,
        walker: &dyn DirectoryWalker,
        config: &EngineConfig,
    ) -> Result<Snapshot> {
        let entries = walker.walk(root)?;

        let mut files = BTreeSet::new();
        let mut subdirs = BTreeSet::new();
        for entry in entries {
            if entry.is_dir {
                subdirs.insert(entry.rel_path);
            } else {
                files.insert(entry.rel_path);
            }
        }

        let block_size = config.block_size;
        let per_file: BTreeMap<String, (BlockSignature, StrongHash)> = files
            .par_iter()
            .map(|rel| {
                let path = root.join(rel);
                let reader = BufReader::new(File::open(&path)?);
                let (sig, hash) = signature_and_hash(reader, block_size)?;
                Ok((rel.clone(), (sig, hash)))
            })
            .collect::<Result<_>>()?;

        let tree_hash = aggregate_tree_hash(per_file.iter().map(|(p, (_, h))| (p.as_str(), *h)));
        let signatures = per_file
            .into_iter()
            .map(|(path, (sig, _))| (path, sig))
            .collect();

        debug!(key, files = files.len(), subdirs = subdirs.len(), "captured snapshot");

        Ok(Snapshot {
            key: key.to_string(),
            time: Utc::now(),
            files,
            subdirs,
            signatures,
            tree_hash,
        })
    }

    /// Timestamp rendered for artifact naming.
    pub fn ts(&self) -> String {
        names::format_ts(self.time)
    }

    pub fn record_name(&self) -> String {
        names::state_record_name(&self.key, &self.ts())
    }

    /// Persist the snapshot record as JSON through the blob store.
    pub fn persist(&self, store: &dyn BlobStore) -> Result<String> {
        let name = self.record_name();
        store.put(&name, &serde_json::to_vec(self)?)?;
        Ok(name)
    }

    pub fn load(store: &dyn BlobStore, name: &str) -> Result<Option<Snapshot>> {
        match store.get(name)? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }
}

/// One pass over a file computing both its block signature and its
/// whole-content hash.
fn signature_and_hash<R: std::io::Read>(
    mut reader: R,
    block_size: usize,
) -> Result<(BlockSignature, StrongHash)> {
    // Tee each block into the block hashers and the whole-file hasher.
    let mut file_hasher = Sha256::new();
    let mut blocks = Vec::new();
    let mut file_length = 0u64;
    let mut buf = vec![0u8; block_size];
    loop {
        let n = read_block(&mut reader, &mut buf)?;
        if n == 0 {
            break;
        }
        let chunk = &buf[..n];
        file_hasher.update(chunk);
        blocks.push(Block {
            weak: RollingChecksum::new(chunk).digest(),
            strong: StrongHash::compute(chunk),
        });
        file_length += n as u64;
        if n < block_size {
            break;
        }
    }
    Ok((
        BlockSignature {
            block_size,
            file_length,
            blocks,
        },
        StrongHash::from_digest(file_hasher),
    ))
}

/// Deterministic aggregate over sorted `(path, content hash)` pairs.
fn aggregate_tree_hash<'a>(pairs: impl Iterator<Item = (&'a str, StrongHash)>) -> StrongHash {
    let mut hasher = Sha256::new();
    for (path, hash) in pairs {
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update(hash.0);
    }
    StrongHash::from_digest(hasher)
}

/// Recompute the tree hash of an on-disk tree, for verification after a
/// restore. Uses the same walker abstraction as capture.
pub fn tree_hash_of(root: &Path, walker: &dyn DirectoryWalker) -> Result<StrongHash> {
    let entries = walker.walk(root)?;
    let mut files: Vec<String> = entries
        .into_iter()
        .filter(|e| !e.is_dir)
        .map(|e| e.rel_path)
        .collect();
    files.sort();

    let hashes: Vec<(String, StrongHash)> = files
        .par_iter()
        .map(|rel| {
            let reader = BufReader::new(File::open(root.join(rel))?);
            let (hash, _) = hash_stream(reader)?;
            Ok((rel.clone(), hash))
        })
        .collect::<Result<_>>()?;

    Ok(aggregate_tree_hash(
        hashes.iter().map(|(p, h)| (p.as_str(), *h)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn capture_collects_files_and_subdirs() {
        let tmp = tempfile::tempdir().unwrap();
        write_tree(
            tmp.path(),
            &[
                ("file1", b"one".as_slice()),
                ("dir1/subdir1/file_subdir1", b"sub".as_slice()),
            ],
        );
        let config = EngineConfig::default();
        let snap =
            Snapshot::capture("k", tmp.path(), &IgnoreWalker::default(), &config).unwrap();

        assert!(snap.files.contains("file1"));
        assert!(snap.files.contains("dir1/subdir1/file_subdir1"));
        assert!(snap.subdirs.contains("dir1"));
        assert!(snap.subdirs.contains("dir1/subdir1"));
        // Invariant: signatures keyed exactly by files.
        assert_eq!(
            snap.signatures.keys().cloned().collect::<BTreeSet<_>>(),
            snap.files
        );
    }

    #[test]
    fn identical_trees_same_tree_hash() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let files = [
            ("file1", b"alpha".as_slice()),
            ("dir2/file_dir2", b"beta".as_slice()),
        ];
        write_tree(a.path(), &files);
        write_tree(b.path(), &files);

        let config = EngineConfig::default();
        let walker = IgnoreWalker::default();
        let sa = Snapshot::capture("k", a.path(), &walker, &config).unwrap();
        let sb = Snapshot::capture("k", b.path(), &walker, &config).unwrap();
        assert_eq!(sa.tree_hash, sb.tree_hash);
    }

    #[test]
    fn content_change_changes_tree_hash() {
        let tmp = tempfile::tempdir().unwrap();
        write_tree(tmp.path(), &[("file1", b"before".as_slice())]);
        let config = EngineConfig::default();
        let walker = IgnoreWalker::default();
        let s1 = Snapshot::capture("k", tmp.path(), &walker, &config).unwrap();

        fs::write(tmp.path().join("file1"), b"after").unwrap();
        let s2 = Snapshot::capture("k", tmp.path(), &walker, &config).unwrap();
        assert_ne!(s1.tree_hash, s2.tree_hash);
    }

    #[test]
    fn tree_hash_of_matches_capture() {
        let tmp = tempfile::tempdir().unwrap();
        write_tree(
            tmp.path(),
            &[("a", b"1".as_slice()), ("d/b", b"2".as_slice())],
        );
        let config = EngineConfig::default();
        let walker = IgnoreWalker::default();
        let snap = Snapshot::capture("k", tmp.path(), &walker, &config).unwrap();
        assert_eq!(tree_hash_of(tmp.path(), &walker).unwrap(), snap.tree_hash);
    }

    #[test]
    fn persist_and_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        write_tree(tmp.path(), &[("file1", b"contents".as_slice())]);
        let config = EngineConfig::default();
        let snap =
            Snapshot::capture("k", tmp.path(), &IgnoreWalker::default(), &config).unwrap();

        let store = crate::storage::MemoryStore::new();
        let name = snap.persist(&store).unwrap();
        let loaded = Snapshot::load(&store, &name).unwrap().unwrap();
        assert_eq!(loaded.files, snap.files);
        assert_eq!(loaded.tree_hash, snap.tree_hash);
        assert_eq!(loaded.signatures, snap.signatures);
    }
}
