//! Blob naming conventions for persisted artifacts.
//!
//! One backup run produces a state record plus archive artifacts, all
//! keyed by backup key and a second-precision UTC timestamp:
//!
//! - `{key}.state.{ts}.json` — persisted snapshot record
//! - `{key}.full.{ts}.tgz` — full backup archive
//! - `{key}.created.{ts}.tgz` / `{key}.updated.{ts}.tgz` — incrementals
//! - `{archive_key}.vol{N}.tgz` — one volume of a split archive
//! - `{archive_key}.volindex` — persisted volume index

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{Result, SigvaultError};

/// Second-precision, lexicographically sortable, safe as a file name.
pub const TS_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

pub fn format_ts(time: DateTime<Utc>) -> String {
    time.format(TS_FORMAT).to_string()
}

pub fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .map_err(|e| SigvaultError::InvalidFormat(format!("bad timestamp '{s}': {e}")))?;
    Ok(naive.and_utc())
}

pub fn state_record_name(key: &str, ts: &str) -> String {
    format!("{key}.state.{ts}.json")
}

pub fn state_record_prefix(key: &str) -> String {
    format!("{key}.state.")
}

/// Extract the timestamp portion of a `{key}.state.{ts}.json` name.
pub fn ts_of_state_record(key: &str, name: &str) -> Option<String> {
    let rest = name.strip_prefix(&state_record_prefix(key))?;
    let ts = rest.strip_suffix(".json")?;
    Some(ts.to_string())
}

pub fn full_archive_name(key: &str, ts: &str) -> String {
    format!("{key}.full.{ts}.tgz")
}

/// Archive key of a full backup, used when the archive is split into
/// volumes: volumes are `{archive_key}.vol{N}.tgz`.
pub fn full_archive_key(key: &str, ts: &str) -> String {
    format!("{key}.full.{ts}")
}

pub fn created_archive_name(key: &str, ts: &str) -> String {
    format!("{key}.created.{ts}.tgz")
}

pub fn updated_archive_name(key: &str, ts: &str) -> String {
    format!("{key}.updated.{ts}.tgz")
}

pub fn volume_name(archive_key: &str, index: u32) -> String {
    format!("{archive_key}.vol{index}.tgz")
}

pub fn volume_index_name(archive_key: &str) -> String {
    format!("{archive_key}.volindex")
}
