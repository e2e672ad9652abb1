use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use crate::error::{Result, SigvaultError};
use crate::storage::BlobStore;

/// Blob store backed by a flat directory of files.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at the given directory, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(LocalStore { root })
    }

    /// Reject blob names that could escape the store root.
    fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(SigvaultError::InvalidFormat("unsafe blob name: empty".into()));
        }
        if name.starts_with('/') || name.contains('\\') {
            return Err(SigvaultError::InvalidFormat(format!(
                "unsafe blob name: '{name}'"
            )));
        }
        for component in Path::new(name).components() {
            if component == Component::ParentDir {
                return Err(SigvaultError::InvalidFormat(format!(
                    "unsafe blob name: parent traversal '{name}'"
                )));
            }
        }
        Ok(())
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        Self::validate_name(name)?;
        Ok(self.root.join(name))
    }

    /// Write to a temp file in the store directory, then atomically
    /// rename into place so readers never observe a partial blob.
    fn atomic_write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let dir = path.parent().unwrap_or(&self.root);
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(data)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl BlobStore for LocalStore {
    fn put(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.atomic_write(&path, data)
    }

    fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(name)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, name: &str) -> Result<bool> {
        let path = self.resolve(name)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, name: &str) -> Result<()> {
        let path = self.resolve(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(prefix) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
