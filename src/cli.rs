///
/// This module implements the CLI interface for arxiv-latex: command parsing,
/// config overrides, and the per-shard loop around the core [`Cleaner`].
///
/// All pipeline logic (shard reading, flattening, records, worker pool) lives
/// in the `arxiv-latex-core` crate. This module is strictly CLI glue.
///
/// ## How To Use
/// - For command-line users: run the `arxiv-latex` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
use crate::load_config::{load_config, CliConfig};
use anyhow::{Context, Result};
use arxiv_latex_core::acquire::{plan_shards, release, LocalCatalog};
use arxiv_latex_core::coordinator::{Cleaner, RunReport};
use arxiv_latex_core::flatten::Latexpand;
use arxiv_latex_core::pipeline::expand_shard_paths;
use arxiv_latex_core::record::format_arxiv_id;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

/// CLI for arxiv-latex: turn arXiv source shards into flattened LaTeX JSONL.
#[derive(Parser)]
#[clap(
    name = "arxiv-latex",
    version,
    about = "Extract, flatten and export LaTeX projects from bulk arXiv source shards"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process every pending shard in the archive directory
    Clean {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Only keep projects whose .tex files match this byte regex
        #[clap(long)]
        filter: Option<String>,
        /// Skip shards older than this date (YYYY-MM-DD)
        #[clap(long)]
        cutoff: Option<NaiveDate>,
        /// Stop each shard after this many loaded projects
        #[clap(long)]
        max_files: Option<i64>,
        /// Worker pool size; 1 runs sequentially
        #[clap(long)]
        workers: Option<usize>,
        /// Gzip the output files
        #[clap(long)]
        compress: bool,
        /// Show progress while processing
        #[clap(long)]
        verbose: bool,
    },
    /// Print the normalised form of a raw arXiv id
    FormatId {
        /// Raw id as found in shard file names, e.g. hep-th9901001
        raw: String,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Clean {
            config,
            filter,
            cutoff,
            max_files,
            workers,
            compress,
            verbose,
        } => {
            let mut config = load_config(config)?;
            if filter.is_some() {
                config.filter = filter;
            }
            if cutoff.is_some() {
                config.cutoff = cutoff;
            }
            if let Some(max_files) = max_files {
                config.max_files = max_files;
            }
            if workers.is_some() {
                config.workers = workers;
            }
            config.compress |= compress;
            clean(&config, verbose).await
        }
        Commands::FormatId { raw } => {
            let id = format_arxiv_id(&raw)?;
            println!("{id}");
            Ok(())
        }
    }
}

async fn clean(config: &CliConfig, verbose: bool) -> Result<()> {
    let cleaner_config = config.cleaner_config(verbose);
    cleaner_config.trace_loaded();
    cleaner_config
        .ensure_dirs()
        .context("Failed to create output/work directories")?;
    std::fs::create_dir_all(&config.archive_dir).with_context(|| {
        format!(
            "Failed to create archive directory {}",
            config.archive_dir.display()
        )
    })?;

    let sequential = cleaner_config.workers() == 1;
    let flattener = Arc::new(Latexpand::new(&config.flattener));
    let cleaner = Cleaner::new(cleaner_config, flattener).with_filter(config.content_filter()?);

    let catalog = Arc::new(LocalCatalog::new(&config.archive_dir));
    let plan = plan_shards(catalog, &config.plan_options()).await?;
    println!("Found {} shard(s) to process.", plan.len());

    for input in plan {
        let item = input.item().to_string();
        let path = match input.resolve().await {
            Ok(path) => path,
            Err(e) => {
                tracing::error!(item = %item, error = %e, "Failed to acquire shard, skipping");
                continue;
            }
        };
        let shards = match expand_shard_paths(std::slice::from_ref(&path)) {
            Ok(shards) => shards,
            Err(e) => {
                tracing::error!(item = %item, error = %e, "Failed to list shard files, skipping");
                continue;
            }
        };

        let report = if sequential {
            let cleaner = cleaner.clone();
            let name = item.clone();
            tokio::task::spawn_blocking(move || cleaner.run(shards, Some(&name))).await??
        } else {
            cleaner.run_parallel(shards, Some(&item)).await?
        };
        print_report(&item, &report);

        if config.delete_processed {
            release(&path, &config.archive_dir)?;
        }
    }

    println!("Clean complete.");
    Ok(())
}

fn print_report(item: &str, report: &RunReport) {
    println!(
        "{item}: processed={} failed={} emitted={} empty={} -> {}",
        report.processed,
        report.failed,
        report.emitted,
        report.dropped_empty,
        report.output.display()
    );
}
