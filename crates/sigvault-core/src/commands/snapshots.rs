//! Listing of persisted backup runs for a key.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::names;
use crate::storage::BlobStore;

/// One persisted backup run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    pub ts: String,
    pub time: DateTime<Utc>,
    /// Whether a full backup artifact exists at this timestamp.
    pub is_full: bool,
}

/// Enumerate all backup runs recorded for `key`, ascending by time.
pub fn list(store: &dyn BlobStore, key: &str) -> Result<Vec<RunInfo>> {
    let mut runs = Vec::new();
    for name in store.list(&names::state_record_prefix(key))? {
        if let Some(ts) = names::ts_of_state_record(key, &name) {
            let time = names::parse_ts(&ts)?;
            let is_full = store.exists(&names::full_archive_name(key, &ts))?
                || store
                    .exists(&names::volume_index_name(&names::full_archive_key(key, &ts)))?;
            runs.push(RunInfo { ts, time, is_full });
        }
    }
    runs.sort_by(|a, b| a.time.cmp(&b.time));
    Ok(runs)
}
