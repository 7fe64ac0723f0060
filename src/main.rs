//! dsarrow CLI - inspect, verify and reshard Arrow-format datasets

use anyhow::{bail, Context, Result};
use clap::Parser;
use dsarrow::config::{CliArgs, Commands, ExportOptions, ReshardArgs};
use dsarrow::dataset::Dataset;
use dsarrow::env::Environment;
use dsarrow::hash::DirectorySnapshot;
use dsarrow::store::shard::{read_shard, read_shard_metadata};
use dsarrow::store::{list_shards, ImportOptions, Importer};
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Initialize logging; RUST_LOG wins over -v/-q
    let level = match (args.quiet, args.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(false)
        .init();

    // Handle result
    if let Err(e) = run(&args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: &CliArgs) -> Result<()> {
    match &args.command {
        Commands::Detect { path } => cmd_detect(path),
        Commands::Info { path } => cmd_info(path),
        Commands::Verify {
            path,
            require_media,
        } => cmd_verify(path, *require_media),
        Commands::Reshard(reshard) => cmd_reshard(reshard, args.quiet),
    }
}

fn cmd_detect(path: &Path) -> Result<()> {
    let formats = Environment::new().detect_dataset(path);
    if formats.is_empty() {
        bail!("no known dataset format found in {}", path.display());
    }
    for format in formats {
        println!("{}", format);
    }
    Ok(())
}

fn cmd_info(path: &Path) -> Result<()> {
    let shards = list_shards(path).with_context(|| format!("listing {}", path.display()))?;
    if shards.is_empty() {
        bail!("{} contains no shard files", path.display());
    }

    let first = shards.values().flatten().next().map(|s| s.path.clone());
    if let Some(first) = first {
        let metadata = read_shard_metadata(&first)
            .with_context(|| format!("reading {}", first.display()))?;
        println!("=== Dataset ===");
        println!("Format:     {} {}", metadata.format, metadata.version);
        println!(
            "Labels:     {}",
            metadata.categories.labels.as_ref().map_or(0, |l| l.len())
        );
        println!("Infos:      {}", metadata.infos.len());
        println!("Options:    {}", serde_json::to_string(&metadata.options)?);
    }

    let snapshot = DirectorySnapshot::take(path)?;
    println!("\n=== Subsets ===");
    for (subset, files) in &shards {
        let mut items = 0;
        for file in files {
            items += read_shard(&file.path)
                .with_context(|| format!("reading {}", file.path.display()))?
                .1
                .len();
        }
        println!("{} ({} items, {} shards)", subset, items, files.len());

        for file in files {
            let name = file
                .path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if let Some(digest) = snapshot.files.get(&name) {
                println!(
                    "  {}  {:>10}  {}",
                    name,
                    humansize::format_size(digest.size, humansize::BINARY),
                    digest
                );
            }
        }
    }

    println!(
        "\nTotal: {} files, {}",
        snapshot.files.len(),
        humansize::format_size(snapshot.total_size(), humansize::BINARY)
    );
    Ok(())
}

fn cmd_verify(path: &Path, require_media: bool) -> Result<()> {
    let options = ImportOptions::default().require_media(require_media);
    let dataset = Importer::with_options(options)
        .import(path)
        .with_context(|| format!("verifying {}", path.display()))?;

    for subset in dataset.subset_names() {
        println!("{:<20} {:>8} items", subset, dataset.subset_items(subset).len());
    }
    println!("OK: {} items", dataset.len());
    Ok(())
}

fn cmd_reshard(args: &ReshardArgs, quiet: bool) -> Result<()> {
    let options = ExportOptions::from_cli(args).map_err(anyhow::Error::msg)?;

    let mut dataset = Dataset::import(&args.source)
        .with_context(|| format!("importing {}", args.source.display()))?;

    // Destination may hold an earlier export; show what this run changed
    let before = if args.destination.is_dir() {
        DirectorySnapshot::take(&args.destination)?
    } else {
        DirectorySnapshot::default()
    };
    let report = dataset
        .export(&args.destination, options)
        .with_context(|| format!("exporting to {}", args.destination.display()))?;

    if !quiet {
        let bytes: u64 = report
            .written
            .iter()
            .filter_map(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .sum();
        println!("=== Reshard Complete ===");
        println!("Items:        {}", dataset.len());
        println!("Subsets:      {}", report.rewritten_subsets.len());
        println!("Shards:       {}", report.written.len());
        println!("Shard bytes:  {}", humansize::format_size(bytes, humansize::BINARY));
        println!("Media files:  {}", report.media_written);
        println!();
        before
            .diff(&DirectorySnapshot::take(&args.destination)?)
            .print_summary();
    }
    Ok(())
}
