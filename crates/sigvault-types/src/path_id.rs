use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identifier for a relative path inside an archive: the SHA-256 of the
/// path string, hex-encoded. Archive entries are named by path hash so
/// arbitrary relative paths never need escaping in the container format.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathId(pub [u8; 32]);

impl PathId {
    /// Compute the identifier for a `/`-separated relative path.
    pub fn for_path(rel_path: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(rel_path.as_bytes());
        let result = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&result);
        PathId(out)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Entry name under a logical archive namespace, e.g. `created/<hex>`.
    pub fn entry_name(&self, namespace: &str) -> String {
        format!("{}/{}", namespace, self.to_hex())
    }
}

impl fmt::Debug for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PathId({})", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        assert_eq!(PathId::for_path("dir1/file1"), PathId::for_path("dir1/file1"));
    }

    #[test]
    fn distinct_paths_distinct_ids() {
        assert_ne!(PathId::for_path("file1"), PathId::for_path("file2"));
    }

    #[test]
    fn entry_name_namespaced() {
        let id = PathId::for_path("file1");
        let name = id.entry_name("created");
        assert!(name.starts_with("created/"));
        assert_eq!(name.len(), "created/".len() + 64);
    }

    #[test]
    fn hashes_path_not_content() {
        // Same id regardless of what the file contains; only the path matters.
        let id = PathId::for_path("a/b/c.txt");
        assert_eq!(id.to_hex().len(), 64);
    }
}
