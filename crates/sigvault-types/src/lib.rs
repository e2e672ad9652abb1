pub mod path_id;
pub mod strong_hash;

pub use path_id::PathId;
pub use strong_hash::StrongHash;
