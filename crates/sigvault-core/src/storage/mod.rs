//! Blob store collaborator: named byte blobs, no further structure.
//!
//! Backup artifacts (state records, archives, volumes, volume indexes)
//! are persisted through this interface so the engine stays
//! storage-agnostic. [`LocalStore`] keeps blobs in a directory;
//! [`MemoryStore`] backs tests.

pub mod local;
pub mod memory;

pub use local::LocalStore;
pub use memory::MemoryStore;

use crate::error::Result;

pub trait BlobStore: Sync {
    /// Store a blob under `name`, replacing any previous contents.
    fn put(&self, name: &str, data: &[u8]) -> Result<()>;

    /// Fetch a blob; `None` if absent.
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>>;

    fn exists(&self, name: &str) -> Result<bool>;

    /// Remove a blob; removing an absent blob is not an error.
    fn delete(&self, name: &str) -> Result<()>;

    /// Names of all blobs starting with `prefix`.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}
