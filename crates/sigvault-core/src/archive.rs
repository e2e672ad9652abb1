//! Content-addressed tgz archives of backup payloads, and their inverse:
//! applying a packed diff to an existing tree.
//!
//! Entries live under two logical namespaces, `created/` and `updated/`,
//! each named by the SHA-256 of the file's relative path — arbitrary
//! paths never need quoting inside the container. Unknown entries are
//! ignored on read.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sigvault_types::{PathId, StrongHash};
use tracing::{info, warn};

use crate::delta::{self, Delta};
use crate::diff::{ChangeSet, SnapshotDiff};
use crate::error::{Result, SigvaultError};
use crate::signature::BlockSignature;
use crate::snapshot::tree_hash_of;
use crate::walker::DirectoryWalker;

/// Builds a gzip-compressed tar archive in memory.
pub struct ArchiveWriter {
    builder: tar::Builder<GzEncoder<Vec<u8>>>,
}

impl ArchiveWriter {
    pub fn new() -> Self {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        ArchiveWriter {
            builder: tar::Builder::new(encoder),
        }
    }

    /// Append raw bytes under an explicit entry name.
    pub fn add_bytes(&mut self, entry_name: &str, data: &[u8]) -> Result<()> {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        self.builder.append_data(&mut header, entry_name, data)?;
        Ok(())
    }

    /// Append a directory entry (needed so empty directories survive a
    /// full-tree round trip).
    pub fn add_dir(&mut self, entry_name: &str) -> Result<()> {
        let mut header = tar::Header::new_gnu();
        header.set_size(0);
        header.set_mode(0o755);
        header.set_entry_type(tar::EntryType::Directory);
        header.set_cksum();
        let name = format!("{}/", entry_name.trim_end_matches('/'));
        self.builder.append_data(&mut header, name, &[][..])?;
        Ok(())
    }

    pub fn finish(self) -> Result<Vec<u8>> {
        let encoder = self.builder.into_inner()?;
        Ok(encoder.finish()?)
    }
}

impl Default for ArchiveWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Package a diff: created files' raw bytes under `created/{hash(path)}`,
/// serialized deltas under `updated/{hash(path)}`.
pub fn pack_diff(diff: &SnapshotDiff, source_root: &Path) -> Result<Vec<u8>> {
    let mut writer = ArchiveWriter::new();
    append_created(&mut writer, &diff.changes, source_root)?;
    append_updated(&mut writer, &diff.deltas)?;
    writer.finish()
}

/// Package only the created files of a diff.
pub fn pack_created(changes: &ChangeSet, source_root: &Path) -> Result<Vec<u8>> {
    let mut writer = ArchiveWriter::new();
    append_created(&mut writer, changes, source_root)?;
    writer.finish()
}

/// Package only the deltas of a diff.
pub fn pack_updated(deltas: &BTreeMap<String, Delta>) -> Result<Vec<u8>> {
    let mut writer = ArchiveWriter::new();
    append_updated(&mut writer, deltas)?;
    writer.finish()
}

fn append_created(
    writer: &mut ArchiveWriter,
    changes: &ChangeSet,
    source_root: &Path,
) -> Result<()> {
    for rel in &changes.created {
        let data = fs::read(source_root.join(rel))?;
        writer.add_bytes(&PathId::for_path(rel).entry_name("created"), &data)?;
    }
    Ok(())
}

fn append_updated(writer: &mut ArchiveWriter, deltas: &BTreeMap<String, Delta>) -> Result<()> {
    for (rel, delta) in deltas {
        writer.add_bytes(&PathId::for_path(rel).entry_name("updated"), &delta.to_bytes()?)?;
    }
    Ok(())
}

/// Package a whole tree for a full backup; entries are the relative
/// paths themselves (a full archive is extracted, never addressed by
/// path hash).
pub fn pack_tree(root: &Path, walker: &dyn DirectoryWalker) -> Result<Vec<u8>> {
    let mut entries = walker.walk(root)?;
    entries.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));

    let mut writer = ArchiveWriter::new();
    for entry in &entries {
        if entry.is_dir {
            writer.add_dir(&entry.rel_path)?;
        } else {
            let data = fs::read(root.join(&entry.rel_path))?;
            writer.add_bytes(&entry.rel_path, &data)?;
        }
    }
    writer.finish()
}

/// Read every entry of a gzip-compressed tar payload into a name → bytes
/// map. Directory entries are recorded with empty contents.
pub fn read_entries(payload: &[u8]) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut archive = tar::Archive::new(GzDecoder::new(payload));
    let mut out = BTreeMap::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry
            .path()?
            .to_str()
            .map(|s| s.trim_end_matches('/').to_string())
            .ok_or_else(|| SigvaultError::InvalidFormat("non-UTF-8 archive entry".into()))?;
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        out.insert(name, data);
    }
    Ok(out)
}

/// Extract a full-tree archive into `dest`.
pub fn extract_tree(payload: &[u8], dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)?;
    let mut archive = tar::Archive::new(GzDecoder::new(payload));
    archive.unpack(dest)?;
    Ok(())
}

/// One file that could not be applied. The rest of the apply keeps going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: String,
    pub error: String,
}

/// Post-apply whole-tree verification outcome. A mismatch is surfaced in
/// the report, never silently logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityOutcome {
    Verified,
    Mismatch {
        expected: StrongHash,
        actual: StrongHash,
    },
    /// No target hash was supplied, so nothing was checked.
    Skipped,
}

/// Result of applying an archive to a target tree. A returned `Ok`
/// report can still carry per-file failures — callers must inspect it.
#[derive(Debug, Clone)]
pub struct ApplyReport {
    pub failures: Vec<FileFailure>,
    pub integrity: IntegrityOutcome,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !matches!(self.integrity, IntegrityOutcome::Mismatch { .. })
    }
}

/// Everything needed to apply one packed diff to a tree.
pub struct ApplyRequest<'a> {
    pub changes: &'a ChangeSet,
    /// Payload holding `created/` entries, if any were packed.
    pub created_archive: Option<&'a [u8]>,
    /// Payload holding `updated/` entries, if any were packed.
    pub updated_archive: Option<&'a [u8]>,
    /// Signatures of the base snapshot, used to reject deltas whose
    /// block size disagrees with the signature they were built from.
    pub base_signatures: Option<&'a BTreeMap<String, BlockSignature>>,
    /// Tree hash the target must match after the apply; `None` skips
    /// the integrity check.
    pub target_tree_hash: Option<StrongHash>,
}

/// Apply a packed diff to `target_root`: patch updated files, write
/// created files, remove deleted files and empty deleted directories,
/// then verify the tree hash.
///
/// Missing archive entries and corrupt deltas fail only the file they
/// belong to; all such failures are collected in the report. I/O errors
/// and block-size mismatches abort the whole apply.
pub fn apply(
    req: &ApplyRequest<'_>,
    target_root: &Path,
    walker: &dyn DirectoryWalker,
) -> Result<ApplyReport> {
    let created_entries = match req.created_archive {
        Some(payload) => read_entries(payload)?,
        None => BTreeMap::new(),
    };
    let updated_entries = match req.updated_archive {
        Some(payload) => read_entries(payload)?,
        None => BTreeMap::new(),
    };

    let mut failures = Vec::new();

    // Updated files first: the delta patches the file currently on disk.
    for rel in &req.changes.updated {
        let entry_name = PathId::for_path(rel).entry_name("updated");
        let Some(payload) = updated_entries.get(&entry_name) else {
            failures.push(FileFailure {
                path: rel.clone(),
                error: SigvaultError::ArchiveCorrupted(rel.clone()).to_string(),
            });
            continue;
        };
        match patch_file(rel, payload, req, target_root) {
            Ok(()) => {}
            Err(e @ (SigvaultError::CorruptDelta { .. } | SigvaultError::Decode(_))) => {
                failures.push(FileFailure {
                    path: rel.clone(),
                    error: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    // Created files: write bytes, making parent directories as needed.
    for rel in &req.changes.created {
        let entry_name = PathId::for_path(rel).entry_name("created");
        let Some(data) = created_entries.get(&entry_name) else {
            failures.push(FileFailure {
                path: rel.clone(),
                error: SigvaultError::ArchiveCorrupted(rel.clone()).to_string(),
            });
            continue;
        };
        let target = target_root.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        atomic_replace(&target, data)?;
    }

    // Deleted files: absence is fine, removal is idempotent.
    for rel in &req.changes.deleted {
        let target = target_root.join(rel);
        match fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    // Deleted directories: only removed when empty; a still-populated
    // directory is logged and left in place.
    for rel in deepest_first(&req.changes.deleted_dirs) {
        let target = target_root.join(rel);
        if target.is_dir() {
            if let Err(e) = fs::remove_dir(&target) {
                warn!(path = %rel, error = %e, "could not remove deleted directory");
            }
        }
    }

    let integrity = match req.target_tree_hash {
        Some(expected) => {
            let actual = tree_hash_of(target_root, walker)?;
            if actual == expected {
                IntegrityOutcome::Verified
            } else {
                IntegrityOutcome::Mismatch { expected, actual }
            }
        }
        None => IntegrityOutcome::Skipped,
    };

    info!(
        failures = failures.len(),
        verified = matches!(integrity, IntegrityOutcome::Verified),
        "applied archive"
    );

    Ok(ApplyReport { failures, integrity })
}

/// Patch one updated file in place: old bytes come from the file
/// currently at the target path, the result replaces it atomically.
fn patch_file(
    rel: &str,
    delta_payload: &[u8],
    req: &ApplyRequest<'_>,
    target_root: &Path,
) -> Result<()> {
    let delta = Delta::from_bytes(delta_payload)?;
    if let Some(signatures) = req.base_signatures {
        if let Some(sig) = signatures.get(rel) {
            delta.check_block_size(sig)?;
        }
    }

    let target = target_root.join(rel);
    let mut old = File::open(&target)?;
    let mut patched = Vec::new();
    delta::patch(&mut old, &delta, &mut patched)?;
    atomic_replace(&target, &patched)
}

/// Write to a temp file next to the target, then rename into place, so
/// an interrupted apply never leaves a half-written file.
fn atomic_replace(target: &Path, data: &[u8]) -> Result<()> {
    let dir = target
        .parent()
        .ok_or_else(|| SigvaultError::Other(format!("no parent for {}", target.display())))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// Order directory paths so children sort before their parents, letting
/// nested deleted directories collapse bottom-up.
fn deepest_first(dirs: &std::collections::BTreeSet<String>) -> Vec<&String> {
    let mut out: Vec<&String> = dirs.iter().collect();
    out.sort_by_key(|d| std::cmp::Reverse(d.matches('/').count()));
    out
}
