//! Content Dump CLI
//!
//! Materializes content items and packs into an output directory.

use std::path::{Path, PathBuf};
use anyhow::Context;
use clap::{Parser, Subcommand};
use content_sdk::{ContentConfig, ContentItem, DumpEngine, Pack};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "content-dump")]
#[command(about = "Dump and unify content items and packs")]
struct Cli {
    /// Configuration file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump one content item (file or item directory)
    Item {
        path: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Prefix for output file names
        #[arg(long)]
        prefix: Option<String>,

        /// Skip the changelog
        #[arg(long)]
        no_changelog: bool,

        /// Skip the readme
        #[arg(long)]
        no_readme: bool,

        /// Copy the primary file instead of unifying
        #[arg(long)]
        no_unify: bool,
    },

    /// Dump a whole pack, given by name or path
    Pack {
        pack: String,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Keep going after an item fails
        #[arg(long)]
        batch: bool,

        /// Abort after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Dump and print what was written; `Ok(false)` when a pack item failed
fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut config = ContentConfig::load_from(cli.config.as_deref())?;

    match cli.command {
        Commands::Item { path, output, prefix, no_changelog, no_readme, no_unify } => {
            config.dump.include_changelog &= !no_changelog;
            config.dump.include_readme &= !no_readme;
            config.dump.unify &= !no_unify;

            let mut item = ContentItem::detect(&path, config.document_options())
                .with_context(|| format!("Failed to load content item {}", path.display()))?;
            if let Some(prefix) = prefix {
                item.set_prefix(prefix);
            }
            let engine = DumpEngine::new(config.dump_options());
            let written = engine
                .dump(&item, &output)
                .with_context(|| format!("Failed to dump into {}", output.display()))?;

            println!("📦 Dumped {}", item.path().display());
            for file in written {
                println!("  ✅ {}", file.display());
            }
            Ok(true)
        }

        Commands::Pack { pack, output, batch, timeout_secs } => {
            config.dump.batch |= batch;
            if timeout_secs.is_some() {
                config.dump.timeout_secs = timeout_secs;
            }

            let pack_path = if Path::new(&pack).is_dir() {
                PathBuf::from(&pack)
            } else {
                let cwd = std::env::current_dir()?;
                config.content_root(&cwd).pack_path(&pack)
            };
            let pack = Pack::open(&pack_path, config.document_options())
                .with_context(|| format!("Failed to open pack {}", pack_path.display()))?;
            let engine = DumpEngine::new(config.dump_options());

            println!("📦 Dumping pack {}...", pack.name());
            let report = engine.dump_pack(&pack, &output, &config.deadline())?;

            println!("  ✅ {} files written", report.created.len());
            for failure in &report.failures {
                println!("  ❌ {}: {}", failure.path.display(), failure.error);
            }

            Ok(report.is_success())
        }
    }
}
