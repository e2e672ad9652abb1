//! Size-bounded multi-volume archives.
//!
//! An archive's payload can be split across numbered volume blobs,
//! `{archive_key}.vol{N}.tgz`, each a normal tgz container. A volume
//! index maps every entry to the volume(s) holding it, so a single
//! entry can be extracted without opening the whole set. A rolled-past
//! volume is never reopened; writing is strictly single-writer.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::archive::{extract_tree, read_entries, ArchiveWriter};
use crate::error::{Result, SigvaultError};
use crate::names;
use crate::storage::BlobStore;

/// Finalized description of a volume set: the ordered volume blob names
/// and the entry → volumes index. Persisted as `{archive_key}.volindex`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeIndex {
    pub archive_key: String,
    pub volumes: Vec<String>,
    pub entries: BTreeMap<String, BTreeSet<String>>,
}

impl VolumeIndex {
    pub fn persist(&self, store: &dyn BlobStore) -> Result<()> {
        store.put(&names::volume_index_name(&self.archive_key), &rmp_serde::to_vec(self)?)
    }

    pub fn load(store: &dyn BlobStore, archive_key: &str) -> Result<Option<VolumeIndex>> {
        match store.get(&names::volume_index_name(archive_key))? {
            Some(data) => Ok(Some(rmp_serde::from_slice(&data)?)),
            None => Ok(None),
        }
    }
}

/// Writes entries across size-bounded volumes.
///
/// The running size is the sum of entry payload sizes added to the
/// current volume. A volume that already has content is rolled before
/// an add would push it past the limit; an entry larger than the limit
/// still lands whole in one otherwise-empty volume — entries are never
/// split.
pub struct VolumeWriter<'a> {
    store: &'a dyn BlobStore,
    archive_key: String,
    volume_size_limit: u64,
    current: Option<ArchiveWriter>,
    current_volume: u32,
    current_size: u64,
    volumes: Vec<String>,
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl<'a> VolumeWriter<'a> {
    pub fn create(
        store: &'a dyn BlobStore,
        archive_key: impl Into<String>,
        volume_size_limit: u64,
    ) -> Self {
        VolumeWriter {
            store,
            archive_key: archive_key.into(),
            volume_size_limit,
            current: None,
            current_volume: 0,
            current_size: 0,
            volumes: Vec::new(),
            entries: BTreeMap::new(),
        }
    }

    fn current_volume_name(&self) -> String {
        names::volume_name(&self.archive_key, self.current_volume)
    }

    /// Add one entry, rolling to the next volume first if the current
    /// one has content and would exceed the size limit.
    pub fn add(&mut self, entry_name: &str, data: &[u8]) -> Result<()> {
        if self.current.is_none() {
            self.current = Some(ArchiveWriter::new());
        } else if self.current_size > 0
            && self.current_size + data.len() as u64 > self.volume_size_limit
        {
            self.roll()?;
            self.current = Some(ArchiveWriter::new());
        }

        let volume_name = self.current_volume_name();
        let writer = self
            .current
            .as_mut()
            .ok_or_else(|| SigvaultError::Other("no open volume".into()))?;
        writer.add_bytes(entry_name, data)?;
        self.current_size += data.len() as u64;
        self.entries
            .entry(entry_name.to_string())
            .or_default()
            .insert(volume_name);
        Ok(())
    }

    /// Add a directory entry to the current volume (opening volume 0 if
    /// none is open). Directory entries are size zero and never trigger
    /// a roll, but they are tracked in the index like any entry.
    pub fn add_dir(&mut self, entry_name: &str) -> Result<()> {
        if self.current.is_none() {
            self.current = Some(ArchiveWriter::new());
        }
        let volume_name = self.current_volume_name();
        let writer = self
            .current
            .as_mut()
            .ok_or_else(|| SigvaultError::Other("no open volume".into()))?;
        writer.add_dir(entry_name)?;
        self.entries
            .entry(entry_name.to_string())
            .or_default()
            .insert(volume_name);
        Ok(())
    }

    /// Finalize the current volume and advance to the next index. The
    /// closed volume is never written to again.
    fn roll(&mut self) -> Result<()> {
        if let Some(writer) = self.current.take() {
            let name = self.current_volume_name();
            let payload = writer.finish()?;
            debug!(volume = %name, size = payload.len(), "closing volume");
            self.store.put(&name, &payload)?;
            self.volumes.push(name);
            self.current_volume += 1;
            self.current_size = 0;
        }
        Ok(())
    }

    /// Flush the open volume and persist the finalized index. Only a
    /// closed set's volumes are ever referenced by a stored index, so
    /// an interrupted write leaves no volume reachable.
    pub fn close(mut self) -> Result<VolumeIndex> {
        self.roll()?;
        let index = VolumeIndex {
            archive_key: self.archive_key,
            volumes: self.volumes,
            entries: self.entries,
        };
        index.persist(self.store)?;
        Ok(index)
    }
}

/// Reads entries back out of a closed volume set.
pub struct VolumeReader<'a> {
    store: &'a dyn BlobStore,
    index: VolumeIndex,
}

impl<'a> VolumeReader<'a> {
    /// Open a set by its archive key, loading the persisted index.
    pub fn open(store: &'a dyn BlobStore, archive_key: &str) -> Result<VolumeReader<'a>> {
        let index = VolumeIndex::load(store, archive_key)?
            .ok_or_else(|| SigvaultError::EntryNotFound(format!("volume index for '{archive_key}'")))?;
        Ok(VolumeReader { store, index })
    }

    /// Open a set from an already-loaded index (e.g. carried in memory
    /// between write and read of the same run).
    pub fn with_index(store: &'a dyn BlobStore, index: VolumeIndex) -> VolumeReader<'a> {
        VolumeReader { store, index }
    }

    pub fn index(&self) -> &VolumeIndex {
        &self.index
    }

    fn volume_payload(&self, volume_name: &str) -> Result<Vec<u8>> {
        self.store
            .get(volume_name)?
            .ok_or_else(|| SigvaultError::EntryNotFound(format!("volume blob '{volume_name}'")))
    }

    /// Extract every entry of every volume into `dest`, in ascending
    /// volume order.
    pub fn extract_all(&self, dest: &Path) -> Result<()> {
        for volume_name in &self.index.volumes {
            let payload = self.volume_payload(volume_name)?;
            extract_tree(&payload, dest)?;
        }
        Ok(())
    }

    /// Fetch a single entry's bytes via the index.
    pub fn extract_one(&self, entry_name: &str) -> Result<Vec<u8>> {
        let volumes = self
            .index
            .entries
            .get(entry_name)
            .ok_or_else(|| SigvaultError::EntryNotFound(entry_name.to_string()))?;
        let volume_name = volumes
            .iter()
            .next()
            .ok_or_else(|| SigvaultError::EntryNotFound(entry_name.to_string()))?;
        let entries = read_entries(&self.volume_payload(volume_name)?)?;
        entries
            .get(entry_name)
            .cloned()
            .ok_or_else(|| SigvaultError::EntryNotFound(entry_name.to_string()))
    }
}
