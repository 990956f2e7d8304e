//! Content Validator CLI
//!
//! Runs the validator registry over content items and packs.

use std::path::{Path, PathBuf};
use clap::Parser;
use content_sdk::pack::PACK_METADATA;
use content_sdk::{ContentConfig, ContentItem, GitStatuses, Pack, ValidatorRegistry};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "content-validate")]
#[command(about = "Validate content items and packs")]
struct Cli {
    /// Items, item directories or pack directories
    paths: Vec<PathBuf>,

    /// Configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Validate every pack under the content root
    #[arg(short, long)]
    all: bool,

    /// Only run these codes
    #[arg(long, value_delimiter = ',')]
    select: Vec<String>,

    /// Never run these codes
    #[arg(long, value_delimiter = ',')]
    ignore: Vec<String>,

    /// Report these codes without failing
    #[arg(long, value_delimiter = ',')]
    warning: Vec<String>,

    /// Repair auto-fixable findings in place
    #[arg(long)]
    fix: bool,

    /// Apply validators according to git status
    #[arg(long)]
    use_git: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// List registered validators and exit
    #[arg(long)]
    list: bool,
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
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Validate and print the report; `Ok(false)` when errors were found
fn run(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let mut config = ContentConfig::load_from(cli.config.as_deref())?;
    config.validation.select.extend(cli.select);
    config.validation.ignore.extend(cli.ignore);
    config.validation.warning.extend(cli.warning);

    let registry = ValidatorRegistry::with_defaults()?;

    if cli.list {
        for code in registry.codes() {
            if let Some(validator) = registry.get(code) {
                let fixable = if validator.is_auto_fixable() { " (fixable)" } else { "" };
                println!("{} - {}{}", code, validator.description(), fixable);
            }
        }
        return Ok(true);
    }

    let cwd = std::env::current_dir()?;
    let root = config.content_root(&cwd);

    let mut targets = cli.paths.clone();
    if cli.all {
        for entry in std::fs::read_dir(root.packs_dir())? {
            let path = entry?.path();
            if path.is_dir() {
                targets.push(path);
            }
        }
        targets.sort();
    }
    if targets.is_empty() {
        return Err("No paths given, pass item or pack paths or --all".into());
    }

    let statuses = if cli.use_git {
        GitStatuses::collect(&root.path)?
    } else {
        GitStatuses::default()
    };

    let mut items = Vec::new();
    for target in &targets {
        items.extend(load(target, &config, &statuses)?);
    }

    let report = if cli.fix {
        let report = registry.run_fix(&mut items, &config.validation);
        for item in items.iter().filter(|i| i.is_dirty()) {
            item.document().serialize(item.path())?;
        }
        report
    } else {
        registry.run(&items, &config.validation)
    };

    if cli.json {
        println!("{}", report.to_json()?);
    } else {
        println!("🔍 Validated {} items", items.len());
        for fixed in &report.fixed {
            println!("  🔧 {}", fixed);
        }
        for warning in &report.warnings {
            println!("  ⚠️  {}", warning);
        }
        for error in &report.errors {
            println!("  ❌ {}", error);
        }
        if report.is_clean() {
            println!("✅ All validations passed");
        }
    }

    Ok(report.is_clean())
}

/// Items behind one command line path, tagged with their git status
fn load(
    path: &Path,
    config: &ContentConfig,
    statuses: &GitStatuses,
) -> Result<Vec<ContentItem>, Box<dyn std::error::Error>> {
    let options = config.document_options();
    if path.is_dir() && path.join(PACK_METADATA).is_file() {
        return Ok(Pack::open(path, options)?.validation_items(statuses)?);
    }
    let mut item = if path.file_name().map(|n| n == PACK_METADATA).unwrap_or(false) {
        let pack_dir = path.parent().unwrap_or(Path::new("."));
        Pack::open(pack_dir, options)?.metadata_item()?
    } else {
        ContentItem::detect(path, options)?
    };
    item.set_git_status(statuses.status_of(item.path()));
    Ok(vec![item])
}
