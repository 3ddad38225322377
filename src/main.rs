//! Reel CLI

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use reel::cassette::CASSETTE_EXTENSION;
use reel::storage::{decode_request, decode_response, CassetteReader};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        usage();
        process::exit(1);
    }

    let command = &args[1];

    let result = match command.as_str() {
        "inspect" => {
            if args.len() < 3 {
                eprintln!("Usage: reel inspect <cassette-file>");
                process::exit(1);
            }
            inspect(Path::new(&args[2]))
        }
        "stats" => {
            if args.len() < 3 {
                eprintln!("Usage: reel stats <cassette-dir>");
                process::exit(1);
            }
            show_stats(&PathBuf::from(&args[2]))
        }
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'reel' for usage information.");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn usage() {
    eprintln!("Reel v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: reel <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  inspect   List the interactions stored in a cassette");
    eprintln!("  stats     Summarize every cassette in a directory");
}

fn inspect(path: &Path) -> Result<()> {
    let reader = CassetteReader::open(path)
        .with_context(|| format!("Failed to open cassette {}", path.display()))?;

    println!("Cassette: {}", path.display());
    println!("Id: {}", hex::encode(&reader.cassette_id()[..8]));
    println!("Created: {} ns since epoch", reader.created_at());
    println!("Interactions: {}", reader.interaction_count());
    println!();

    for (i, entry) in reader.entries_iter().enumerate() {
        let request = decode_request(reader.read_request(&entry)?)
            .with_context(|| format!("Failed to decode request #{i}"))?;
        let response = decode_response(reader.read_response(&entry)?)
            .with_context(|| format!("Failed to decode response #{i}"))?;

        println!(
            "{i:>4}  {:<7} {}  ->  {} ({} bytes)  [{}]",
            request.method,
            request.url,
            response.status,
            response.body.len(),
            hex::encode(&entry.request_hash[..8])
        );
    }

    Ok(())
}

fn show_stats(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        bail!("Directory not found: {}", dir.display());
    }

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
    {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == CASSETTE_EXTENSION) {
            paths.push(path);
        }
    }
    paths.sort();

    println!("Cassette directory: {}", dir.display());
    println!();

    let mut total_interactions = 0;
    let mut total_bytes = 0;
    for path in &paths {
        let size = std::fs::metadata(path)?.len();
        match CassetteReader::open(path) {
            Ok(reader) => {
                println!(
                    "  {:<40} {:>6} interactions  {:>10} bytes",
                    display_name(path),
                    reader.interaction_count(),
                    size
                );
                total_interactions += reader.interaction_count();
                total_bytes += size;
            }
            Err(e) => println!("  {:<40} unreadable: {e}", display_name(path)),
        }
    }

    println!();
    println!(
        "{} cassettes, {total_interactions} interactions, {total_bytes} bytes",
        paths.len()
    );

    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
