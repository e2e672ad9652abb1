use serde::{Deserialize, Serialize};

/// All tunables for a backup or restore operation.
///
/// Passed explicitly into every operation — there is no process-wide
/// state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fixed block size for signatures and deltas, in bytes.
    ///
    /// Must match between the signature a delta was computed against and
    /// the source bytes used to patch it.
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Size bound for a single archive volume, in bytes.
    #[serde(default = "default_volume_size_limit")]
    pub volume_size_limit: u64,
}

pub(crate) fn default_block_size() -> usize {
    4096
}

pub(crate) fn default_volume_size_limit() -> u64 {
    20 * 1024 * 1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            block_size: default_block_size(),
            volume_size_limit: default_volume_size_limit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.block_size, 4096);
        assert_eq!(cfg.volume_size_limit, 20 * 1024 * 1024);
    }

    #[test]
    fn serde_fills_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.block_size, 4096);
        assert_eq!(cfg.volume_size_limit, 20 * 1024 * 1024);
    }
}
