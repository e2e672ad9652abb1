use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "sigvault",
    version,
    about = "Incremental, storage-agnostic backups with rsync-style deltas"
)]
pub(crate) struct Cli {
    /// Directory holding backup artifacts (state records, archives, volumes)
    #[arg(short = 's', long = "store")]
    pub store: String,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Take a full backup of a directory tree
    Full {
        /// Backup key naming this chain of backups
        key: String,

        /// Directory tree to back up
        path: String,

        /// Exclude patterns (gitignore syntax, repeatable)
        #[arg(short = 'e', long = "exclude")]
        exclude: Vec<String>,

        /// Block size in bytes for signatures and deltas
        #[arg(long)]
        block_size: Option<usize>,

        /// Volume size limit in bytes for split archives
        #[arg(long)]
        volume_size: Option<u64>,
    },

    /// Take an incremental backup against the last recorded state
    Incremental {
        /// Backup key naming this chain of backups
        key: String,

        /// Directory tree to back up
        path: String,

        /// Exclude patterns (gitignore syntax, repeatable)
        #[arg(short = 'e', long = "exclude")]
        exclude: Vec<String>,

        /// Block size in bytes for signatures and deltas
        #[arg(long)]
        block_size: Option<usize>,
    },

    /// Restore the newest backup chain into a directory
    Restore {
        /// Backup key to restore
        key: String,

        /// Destination directory
        dest: String,
    },

    /// List recorded backup runs for a key
    Snapshots {
        /// Backup key to list
        key: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
