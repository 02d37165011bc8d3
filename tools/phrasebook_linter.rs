/// Phrase-book linter: checks `.seed` files for references that go nowhere,
/// rules that never finish, and rules nothing uses.
///
/// Usage: phrasebook_linter <path> [--root <rule>] [--no-imports] [--dump-ron]
use clap::Parser;
use seed_engine::core::import::{DirectoryLoader, SOURCE_EXTENSION};
use seed_engine::core::lint::lint;
use seed_engine::{Engine, RuleTable};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "phrasebook_linter", about = "Lint phrase-book files")]
struct Args {
    /// A `.seed` file, or a directory searched recursively.
    path: PathBuf,

    /// Entry rule used for reachability checks.
    #[arg(long, default_value = "root")]
    root: String,

    /// Lint each file on its own without resolving imports.
    #[arg(long)]
    no_imports: bool,

    /// Print each parsed table as RON.
    #[arg(long)]
    dump_ron: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();

    let mut files = Vec::new();
    if args.path.is_file() {
        files.push(args.path.clone());
    } else if args.path.is_dir() {
        collect_sources(&args.path, &mut files);
        files.sort();
    } else {
        eprintln!("ERROR: Path '{}' does not exist", args.path.display());
        process::exit(1);
    }

    let mut errors = 0;
    let mut warnings = 0;

    for file in &files {
        println!("\n=== {} ===", file.display());
        let table = match load(file, &args).await {
            Ok(table) => table,
            Err(e) => {
                println!("ERROR: {}", e);
                errors += 1;
                continue;
            }
        };
        println!("Loaded {} rules", table.rules.len());

        if args.dump_ron {
            match table.to_ron() {
                Ok(ron) => println!("{}", ron),
                Err(e) => eprintln!("  could not serialise table: {}", e),
            }
        }

        let report = lint(&table, &args.root);
        if report.findings.is_empty() {
            println!("All checks passed!");
        }
        for finding in report.warnings().chain(report.errors()) {
            println!("{}", finding);
        }
        errors += report.errors().count();
        warnings += report.warnings().count();
    }

    println!(
        "\nSummary: {} files, {} errors, {} warnings",
        files.len(),
        errors,
        warnings
    );

    process::exit(if errors == 0 { 0 } else { 1 });
}

async fn load(file: &Path, args: &Args) -> Result<RuleTable, Box<dyn std::error::Error>> {
    let source = std::fs::read_to_string(file)?;
    let mut builder = Engine::builder().root_rule(&args.root);
    if !args.no_imports {
        let dir = file.parent().unwrap_or_else(|| Path::new("."));
        builder = builder.loader(Arc::new(DirectoryLoader::new(dir)));
    }
    let engine = builder.build()?;
    if args.no_imports {
        Ok(seed_engine::core::grammar::parse(&source)?)
    } else {
        Ok(engine.parse(&source).await?)
    }
}

fn collect_sources(dir: &Path, files: &mut Vec<PathBuf>) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                collect_sources(&path, files);
            } else if path.extension().and_then(|s| s.to_str()) == Some(SOURCE_EXTENSION) {
                files.push(path);
            }
        }
    }
}
