pub mod archive;
pub mod chain;
pub mod commands;
pub mod config;
pub mod delta;
pub mod diff;
pub mod error;
pub mod names;
pub mod signature;
pub mod snapshot;
pub mod storage;
pub mod volume;
pub mod walker;

pub use error::{Result, SigvaultError};
