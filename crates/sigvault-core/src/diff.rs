//! Comparison of two snapshots into created/deleted/updated sets and
//! per-updated-file deltas.
//!
//! A file counts as updated only when its block signature differs
//! between the two snapshots — a touched-but-identical file is not a
//! change, and clock skew can never produce a false positive.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sigvault_types::StrongHash;
use tracing::debug;

use crate::delta::{self, Delta};
use crate::error::{Result, SigvaultError};
use crate::snapshot::Snapshot;

/// The pure set-algebra part of a diff; computable from two persisted
/// snapshot records alone, with no filesystem access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub created: BTreeSet<String>,
    pub deleted: BTreeSet<String>,
    pub updated: BTreeSet<String>,
    pub deleted_dirs: BTreeSet<String>,
}

impl ChangeSet {
    /// Compare `compare` (the newer snapshot) against `base` (the older).
    pub fn between(compare: &Snapshot, base: &Snapshot) -> ChangeSet {
        let created = compare.files.difference(&base.files).cloned().collect();
        let deleted = base.files.difference(&compare.files).cloned().collect();
        let deleted_dirs = base.subdirs.difference(&compare.subdirs).cloned().collect();

        let updated = compare
            .files
            .intersection(&base.files)
            .filter(|path| compare.signatures.get(*path) != base.signatures.get(*path))
            .cloned()
            .collect();

        ChangeSet {
            created,
            deleted,
            updated,
            deleted_dirs,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
            && self.deleted.is_empty()
            && self.updated.is_empty()
            && self.deleted_dirs.is_empty()
    }
}

/// A computed diff ready for archive packaging: the change sets, the
/// per-updated-file deltas, and the tree hash the target must reach
/// after the diff is applied.
#[derive(Debug, Clone)]
pub struct SnapshotDiff {
    pub changes: ChangeSet,
    pub deltas: BTreeMap<String, Delta>,
    pub target_tree_hash: StrongHash,
}

impl SnapshotDiff {
    /// Diff `compare` against `base`, reading updated files' new bytes
    /// from `root` (the tree `compare` was captured from) to compute
    /// deltas against the base snapshot's signatures.
    pub fn compute(compare: &Snapshot, base: &Snapshot, root: &Path) -> Result<SnapshotDiff> {
        let changes = ChangeSet::between(compare, base);

        let deltas: BTreeMap<String, Delta> = changes
            .updated
            .par_iter()
            .map(|path| {
                let new_bytes = fs::read(root.join(path))?;
                // Delta is computed against the *old* signature; patching
                // the old bytes with it reproduces the new bytes. A base
                // record listing a file without its signature is malformed.
                let old_sig = base.signatures.get(path).ok_or_else(|| {
                    SigvaultError::InvalidFormat(format!(
                        "state record lists '{path}' without a signature"
                    ))
                })?;
                Ok((path.clone(), delta::diff(&new_bytes, old_sig)))
            })
            .collect::<Result<_>>()?;

        debug!(
            created = changes.created.len(),
            deleted = changes.deleted.len(),
            updated = changes.updated.len(),
            deleted_dirs = changes.deleted_dirs.len(),
            "computed snapshot diff"
        );

        Ok(SnapshotDiff {
            changes,
            deltas,
            target_tree_hash: compare.tree_hash,
        })
    }
}
