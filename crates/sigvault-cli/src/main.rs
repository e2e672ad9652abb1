mod cli;

use std::path::Path;

use clap::Parser;

use sigvault_core::commands::{backup, restore, snapshots};
use sigvault_core::config::EngineConfig;
use sigvault_core::storage::LocalStore;
use sigvault_core::walker::IgnoreWalker;
use sigvault_core::Result;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let store = match LocalStore::new(&cli.store) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&cli.command, &store) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(command: &Commands, store: &LocalStore) -> Result<()> {
    match command {
        Commands::Full {
            key,
            path,
            exclude,
            block_size,
            volume_size,
        } => {
            let root = Path::new(path);
            let mut config = EngineConfig::default();
            if let Some(size) = block_size {
                config.block_size = *size;
            }
            if let Some(limit) = volume_size {
                config.volume_size_limit = *limit;
            }
            let walker = IgnoreWalker::new(exclude.clone());
            let outcome = backup::full(&config, store, key, root, &walker)?;
            println!("full backup {} ({} archive blobs)", outcome.ts, outcome.archives.len());
        }
        Commands::Incremental {
            key,
            path,
            exclude,
            block_size,
        } => {
            let root = Path::new(path);
            let mut config = EngineConfig::default();
            if let Some(size) = block_size {
                config.block_size = *size;
            }
            let walker = IgnoreWalker::new(exclude.clone());
            let outcome = backup::incremental(&config, store, key, root, &walker)?;
            let c = &outcome.changes;
            println!(
                "incremental backup {}: {} created, {} updated, {} deleted",
                outcome.ts,
                c.created.len(),
                c.updated.len(),
                c.deleted.len()
            );
        }
        Commands::Restore { key, dest } => {
            let walker = IgnoreWalker::default();
            let report = restore::run(store, key, Path::new(dest), &walker)?;
            if let sigvault_core::archive::IntegrityOutcome::Mismatch { expected, actual } =
                &report.full_integrity
            {
                eprintln!(
                    "{}: full backup tree hash mismatch (expected {expected}, got {actual})",
                    report.full_ts
                );
            }
            for step in &report.steps {
                for failure in &step.report.failures {
                    eprintln!("{}: {}: {}", step.ts, failure.path, failure.error);
                }
                if let sigvault_core::archive::IntegrityOutcome::Mismatch { expected, actual } =
                    &step.report.integrity
                {
                    eprintln!(
                        "{}: tree hash mismatch (expected {expected}, got {actual})",
                        step.ts
                    );
                }
            }
            if !report.is_clean() {
                std::process::exit(1);
            }
            println!(
                "restored {} from full {} plus {} incremental(s)",
                report.key,
                report.full_ts,
                report.steps.len()
            );
        }
        Commands::Snapshots { key } => {
            let runs = snapshots::list(store, key)?;
            if runs.is_empty() {
                println!("no backups recorded for '{key}'");
            }
            for run in runs {
                let kind = if run.is_full { "full" } else { "incremental" };
                println!("{}  {}", run.ts, kind);
            }
        }
    }
    Ok(())
}
