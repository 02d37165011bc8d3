/// Preview: interactive shell for rendering a phrase book under different
/// seeds and animation times.
///
/// Usage: preview <book.seed> [--seed <token>] [--root <rule>] [--config <file.ron>]
///
/// Commands:
///   gen [rule]             render a rule (default: root) at the current seed and t
///   next / prev / random   step or reroll the seed, then render
///   seed [token]           show or set the seed
///   t [value]              show or set the animation time in [0, 1)
///   arg <name>=<value>     bind an argument for `gen` (`arg clear` to reset)
///   play [frames] [fps]    render frames over one playback cycle
///   reload                 reparse the book from disk
///   lint                   run the linter on the loaded book
///   help                   list commands
///   quit                   exit
use clap::Parser;
use seed_engine::core::import::DirectoryLoader;
use seed_engine::core::lint::lint;
use seed_engine::{Bindings, Engine, EngineConfig, RuleTable, Seed};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "preview", about = "Interactive phrase-book preview")]
struct Args {
    /// Phrase-book source file. Imports resolve against its directory.
    book: PathBuf,

    /// Starting seed; random when omitted.
    #[arg(long)]
    seed: Option<String>,

    /// Rule rendered by `gen` without an argument.
    #[arg(long)]
    root: Option<String>,

    /// Engine settings in RON.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();

    let engine = match build_engine(&args) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    let mut book = match load_book(&engine, &args.book).await {
        Ok(book) => book,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    let mut seed = match args.seed.as_deref().map(Seed::new).transpose() {
        Ok(Some(seed)) => seed,
        Ok(None) => engine.new_seed(),
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };
    let mut t = 0.0;
    let mut bindings = Bindings::default();

    println!("Loaded {} rules from {}", book.rules.len(), args.book.display());
    println!("Seed: {}", seed);
    println!("Type 'help' for commands.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("preview> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts[0].to_lowercase();
        let root = engine.config().root_rule.clone();

        match cmd.as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => print_help(),
            "gen" | "g" => {
                let rule = parts.get(1).copied().unwrap_or(root.as_str());
                show(&engine, &book, rule, &bindings, &seed, t);
            }
            "next" | "n" => {
                seed = engine.next_seed(&seed);
                println!("Seed: {}", seed);
                show(&engine, &book, &root, &bindings, &seed, t);
            }
            "prev" | "p" => match engine.prev_seed(&seed) {
                Ok(prev) => {
                    seed = prev;
                    println!("Seed: {}", seed);
                    show(&engine, &book, &root, &bindings, &seed, t);
                }
                Err(e) => println!("ERROR: {}", e),
            },
            "random" | "r" => {
                seed = engine.new_seed();
                println!("Seed: {}", seed);
                show(&engine, &book, &root, &bindings, &seed, t);
            }
            "seed" => match parts.get(1) {
                None => println!("Current seed: {}", seed),
                Some(token) => match Seed::new(token) {
                    Ok(s) => {
                        seed = s;
                        println!("Seed set to {}", seed);
                    }
                    Err(e) => println!("Invalid seed: {}", e),
                },
            },
            "t" => match parts.get(1).map(|v| v.parse::<f64>()) {
                None => println!("t = {}", t),
                Some(Ok(value)) if (0.0..1.0).contains(&value) => {
                    t = value;
                    println!("t set to {}", t);
                }
                Some(_) => println!("t must be a number in [0, 1)"),
            },
            "arg" => match parts.get(1) {
                Some(&"clear") => {
                    bindings.clear();
                    println!("Arguments cleared.");
                }
                Some(pair) => match pair.split_once('=') {
                    Some((name, value)) => {
                        bindings.insert(name.to_string(), value.to_string());
                        println!("{} = {}", name, value);
                    }
                    None => println!("Usage: arg <name>=<value>"),
                },
                None => {
                    let mut names: Vec<_> = bindings.iter().collect();
                    names.sort();
                    for (name, value) in names {
                        println!("  {} = {}", name, value);
                    }
                }
            },
            "play" => {
                let frames: usize = parts.get(1).and_then(|v| v.parse().ok()).unwrap_or(10).max(1);
                let fps: f64 = parts.get(2).and_then(|v| v.parse().ok()).unwrap_or(10.0);
                play(&engine, &book, &bindings, &seed, frames, fps);
            }
            "reload" => match load_book(&engine, &args.book).await {
                Ok(reloaded) => {
                    book = reloaded;
                    println!("Reloaded {} rules", book.rules.len());
                }
                Err(e) => println!("ERROR: {}", e),
            },
            "lint" => {
                let report = lint(&book, &root);
                if report.findings.is_empty() {
                    println!("All checks passed!");
                }
                for finding in &report.findings {
                    println!("{}", finding);
                }
            }
            _ => println!("Unknown command '{}'. Type 'help' for commands.", cmd),
        }
    }
}

fn build_engine(args: &Args) -> Result<Engine, Box<dyn std::error::Error>> {
    let dir = args.book.parent().unwrap_or_else(|| Path::new("."));
    let mut builder = Engine::builder().loader(Arc::new(DirectoryLoader::new(dir)));
    if let Some(ref path) = args.config {
        builder = builder.config(EngineConfig::load_from_ron(path)?);
    }
    if let Some(ref root) = args.root {
        builder = builder.root_rule(root);
    }
    Ok(builder.build()?)
}

async fn load_book(engine: &Engine, path: &Path) -> Result<RuleTable, Box<dyn std::error::Error>> {
    let source = std::fs::read_to_string(path)?;
    // Pick up edits to imported files too.
    engine.clear_cache();
    Ok(engine.parse(&source).await?)
}

fn show(engine: &Engine, book: &RuleTable, rule: &str, bindings: &Bindings, seed: &Seed, t: f64) {
    match engine.generate(book, rule, bindings, seed, t) {
        Ok(text) => {
            println!("\n--- {} @ {} (t = {}) ---", rule, seed, t);
            println!("{}", text);
            println!("--- End ---\n");
        }
        Err(e) => println!("ERROR: {}", e),
    }
}

fn play(engine: &Engine, book: &RuleTable, bindings: &Bindings, seed: &Seed, frames: usize, fps: f64) {
    let preamble = &book.preamble;
    println!(
        "Playing {} frames ({} animation, {}s per cycle)",
        frames, preamble.animation, preamble.duration
    );
    let root = &engine.config().root_rule;
    let step = preamble.duration / frames as f64;
    for frame in 0..frames {
        let elapsed = step * frame as f64;
        // Frames render one after another; a slow frame delays the next.
        let Some(t) = preamble.frame_time(elapsed) else {
            println!("[done]");
            break;
        };
        match engine.generate(book, root, bindings, seed, t) {
            Ok(text) => println!("[{:>3}] t={:.3} {}", frame, t, text),
            Err(e) => {
                println!("ERROR: {}", e);
                break;
            }
        }
        if fps > 0.0 {
            std::thread::sleep(Duration::from_secs_f64(1.0 / fps));
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  gen [rule]            render a rule at the current seed and t");
    println!("  next | prev | random  change the seed and render");
    println!("  seed [token]          show or set the seed");
    println!("  t [value]             show or set the animation time");
    println!("  arg <name>=<value>    bind an argument (arg clear to reset)");
    println!("  play [frames] [fps]   render one playback cycle");
    println!("  reload                reparse the book");
    println!("  lint                  check the book");
    println!("  quit                  exit");
}
