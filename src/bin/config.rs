//! Content SDK configuration CLI

use std::path::PathBuf;
use clap::{Parser, Subcommand};
use content_sdk::config::ci_from_env;
use content_sdk::ContentConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "content-config")]
#[command(about = "Inspect and initialize content SDK configuration")]
struct Cli {
    /// Configuration file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration as TOML
    Show,

    /// Write a default configuration file
    Init {
        #[arg(default_value = "content-sdk.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the content root and how it was found
    Root,

    /// Print whether the CI environment variable enables CI mode
    Ci,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Show => {
            let config = ContentConfig::load_from(cli.config.as_deref())?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }

        Commands::Init { path, force } => {
            if path.exists() && !force {
                return Err(format!("{} already exists, pass --force to overwrite", path.display()).into());
            }
            ContentConfig::default().save(&path)?;
            println!("✅ Wrote {}", path.display());
            Ok(())
        }

        Commands::Root => {
            let config = ContentConfig::load_from(cli.config.as_deref())?;
            let root = config.content_root(&std::env::current_dir()?);
            println!("{} ({:?})", root.path.display(), root.source);
            Ok(())
        }

        Commands::Ci => {
            println!("{}", ci_from_env()?);
            Ok(())
        }
    }
}
