use thiserror::Error;

pub type Result<T> = std::result::Result<T, SigvaultError>;

#[derive(Debug, Error)]
pub enum SigvaultError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("block size mismatch: delta was built against block size {expected}, got {found}")]
    SignatureMismatch { expected: usize, found: usize },

    #[error("corrupt delta: copy instruction references block {index}, source has {block_count}")]
    CorruptDelta { index: u32, block_count: u32 },

    #[error("archive is missing an expected entry for '{0}'")]
    ArchiveCorrupted(String),

    #[error("entry not found in volume index: '{0}'")]
    EntryNotFound(String),

    #[error("no snapshot record found for backup key '{0}'")]
    SnapshotNotFound(String),

    #[error("no full backup found for backup key '{0}'")]
    NoFullBackup(String),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("walk error: {0}")]
    Walk(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("serialization error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("{0}")]
    Other(String),
}
