use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use imgharvest::core::{DedupReport, format_mb};
use imgharvest::history::CullHistory;
use imgharvest::{Config, Pipeline, RunReport};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(
    name = "imgharvest",
    version,
    about = "Download large images referenced by a saved page and remove duplicates",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// JSON config file (default: <config dir>/imgharvest/config.json)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    run: RunArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Remove filename-based duplicates after download
    #[arg(long)]
    remove_filename_duplicates: bool,

    /// Skip perceptual hash deduplication
    #[arg(long)]
    skip_perceptual_dedup: bool,

    /// Skip cleaning existing photos
    #[arg(long)]
    skip_cleanup: bool,

    /// Only remove filename duplicates, skip download
    #[arg(long)]
    only_remove_duplicates: bool,

    /// Saved page to scan for image URLs
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Directory the per-domain folders are created in
    #[arg(short = 'o', long, value_name = "DIR")]
    download_root: Option<PathBuf>,

    /// Number of parallel downloads and hashing threads
    #[arg(short, long)]
    workers: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Give up starting new downloads after this many seconds
    #[arg(long, value_name = "SECS")]
    deadline: Option<u64>,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,

    /// Hide progress bars
    #[arg(long)]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Work with the cull history
    History {
        #[command(subcommand)]
        command: HistoryCmd,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCmd {
    /// List all cull history records
    List {
        /// History file (default: next to the download root)
        #[arg(short, long, value_name = "FILE")]
        path: Option<PathBuf>,
    },
}

impl RunArgs {
    fn apply(&self, config: &mut Config) {
        config.remove_filename_duplicates |= self.remove_filename_duplicates;
        config.skip_perceptual_dedup |= self.skip_perceptual_dedup;
        config.skip_cleanup |= self.skip_cleanup;
        config.only_remove_duplicates |= self.only_remove_duplicates;
        if let Some(input) = &self.input {
            config.input = input.clone();
        }
        if let Some(root) = &self.download_root {
            config.download_root = root.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(timeout) = self.timeout {
            config.fetch_timeout_secs = timeout;
        }
        if self.deadline.is_some() {
            config.deadline_secs = self.deadline;
        }
        if self.no_progress {
            config.progress = false;
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load config")?;

    match cli.command {
        Some(Commands::History {
            command: HistoryCmd::List { path },
        }) => list_history(path.unwrap_or_else(|| config.history_file())),
        None => {
            cli.run.apply(&mut config);
            let started = Instant::now();
            let report = Pipeline::new(config).run()?;
            if cli.run.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_summary(&report);
                println!("⏱ Finished in {:.2?}", started.elapsed());
            }
            Ok(())
        }
    }
}

fn list_history(path: PathBuf) -> Result<()> {
    let history = CullHistory::new(path);
    println!("🗂️  Cull History ({}):", history.path().display());
    for (i, record) in history.read()?.into_iter().enumerate() {
        match record {
            Ok(rec) => println!(
                "[{}] {} ({:?})\n     kept: {}\n     culled: {:?}\n",
                i, rec.timestamp, rec.stage, rec.retained, rec.culled
            ),
            Err(err) => log::warn!("Skipping malformed entry {}: {}", i, err),
        }
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!("\n{}", "=".repeat(50));
    println!("▶ URLs found: {}", report.urls_found);
    if let Some(acquired) = &report.acquisition {
        println!(
            "▶ Downloaded: {} ({} failed)",
            acquired.succeeded, acquired.failed
        );
    }
    if let Some(dedup) = &report.filename {
        print_dedup("Filename duplicates", dedup);
    }
    if let Some(dedup) = &report.perceptual {
        print_dedup("Visual duplicates", dedup);
        println!("   unique images: {}", dedup.remaining);
    }
    println!("✅ Files in download folder: {}", report.final_files);
}

fn print_dedup(label: &str, dedup: &DedupReport) {
    println!(
        "▶ {}: removed {} in {} group(s), freed {}",
        label,
        dedup.removed,
        dedup.groups,
        format_mb(dedup.bytes_freed)
    );
}
