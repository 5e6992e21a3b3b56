//! Command-line interface for the FlowSOM pipeline.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::MatchMode;
use crate::processors::{pipeline, selection, FileReport, FlowSom};
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "flowsom-pipeline")]
#[command(about = "FlowSOM clustering of flow cytometry samples", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Defaults to `run` with no overrides
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster every matching sample and write labeled tables
    Run(RunArgs),

    /// List the sample files a run would process
    Select {
        /// Directory containing sample tables
        directory: PathBuf,
        /// File name keyword (defaults to the configured one)
        #[arg(short, long)]
        keyword: Option<String>,
    },

    /// Print the effective configuration as YAML, or write it to a file
    Config {
        /// Output YAML path
        path: Option<PathBuf>,
    },
}

/// Overrides applied on top of the loaded configuration.
#[derive(Args, Default)]
struct RunArgs {
    /// Directory containing sample tables
    #[arg(long)]
    input_dir: Option<PathBuf>,
    /// Directory for labeled tables and MST images
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// File name keyword
    #[arg(short, long)]
    keyword: Option<String>,
    /// Treat the keyword as a regular expression
    #[arg(long)]
    regex: bool,
    /// Non-marker columns to drop before training
    #[arg(long, num_args = 1..)]
    drop: Vec<String>,
    /// Smallest candidate cluster count
    #[arg(long)]
    min_k: Option<usize>,
    /// Largest candidate cluster count
    #[arg(long)]
    max_k: Option<usize>,
    /// Seed for SOM training and consensus resampling
    #[arg(long)]
    seed: Option<u64>,
}

impl RunArgs {
    fn apply(self, config: &mut PipelineConfig) {
        if let Some(dir) = self.input_dir {
            config.input.dir = dir;
        }
        if let Some(dir) = self.output_dir {
            config.output.dir = dir;
        }
        if let Some(keyword) = self.keyword {
            config.input.keyword = keyword;
        }
        if self.regex {
            config.input.match_mode = MatchMode::Regex;
        }
        if !self.drop.is_empty() {
            config.input.drop_columns = self.drop;
        }
        if let Some(k) = self.min_k {
            config.meta.min_k = k;
        }
        if let Some(k) = self.max_k {
            config.meta.max_k = k;
        }
        if let Some(seed) = self.seed {
            config.som.seed = seed;
            config.meta.seed = seed;
        }
    }
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config; a bad file is fatal
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                error!("Failed to load config from {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => PipelineConfig::default(),
    };

    let result = match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => cmd_run(args, config),
        Commands::Select { directory, keyword } => cmd_select(&directory, keyword, &config),
        Commands::Config { path } => cmd_config(path, &config),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn cmd_run(args: RunArgs, mut config: PipelineConfig) -> Result<()> {
    let start = Instant::now();
    args.apply(&mut config);

    println!("Running FlowSOM clustering...");
    println!("Input directory: {}", config.input.dir.display());
    println!("Output directory: {}", config.output.dir.display());
    println!("Keyword: {}", config.input.keyword);
    println!(
        "SOM: {}x{}, sigma {}, learning rate {}, {} iterations",
        config.som.x_dim,
        config.som.y_dim,
        config.som.sigma,
        config.som.learning_rate,
        config.som.iterations
    );
    println!("Candidate k: {}..={}", config.meta.min_k, config.meta.max_k);

    let spinner = create_spinner("Selecting sample files...");

    let engine = FlowSom::new();
    let result = pipeline::run_pipeline_with(&engine, &config, |idx, total, name| {
        spinner.set_message(format!("[{}/{}] Clustering {}...", idx + 1, total, name));
    });

    spinner.finish_and_clear();

    let reports = result.context("FlowSOM run failed")?;
    if reports.is_empty() {
        println!("No files matched keyword {:?}", config.input.keyword);
    }

    let mut items: Vec<(&str, String)> = vec![
        ("Input directory", config.input.dir.display().to_string()),
        ("Output directory", config.output.dir.display().to_string()),
        ("Files processed", reports.len().to_string()),
    ];
    items.extend(reports.iter().map(describe_report));
    items.push(("Duration", format!("{:.2?}", start.elapsed())));

    print_summary("FlowSOM Clustering Complete", &items);
    Ok(())
}

fn describe_report(report: &FileReport) -> (&str, String) {
    (
        report.file_name.as_str(),
        format!("k={}, {} rows", report.best_k, report.rows),
    )
}

fn cmd_select(directory: &Path, keyword: Option<String>, config: &PipelineConfig) -> Result<()> {
    let keyword = keyword.unwrap_or_else(|| config.input.keyword.clone());
    let files = selection::select_files(directory, &keyword, config.input.match_mode)
        .with_context(|| format!("Failed to select files in {}", directory.display()))?;

    for name in &files {
        println!("{}", name);
    }

    print_summary(
        "File Selection",
        &[
            ("Directory", directory.display().to_string()),
            ("Keyword", keyword),
            ("Files matched", files.len().to_string()),
        ],
    );
    Ok(())
}

fn cmd_config(path: Option<PathBuf>, config: &PipelineConfig) -> Result<()> {
    match path {
        Some(path) => {
            config
                .to_yaml(&path)
                .map_err(|e| anyhow::anyhow!("{}", e))
                .with_context(|| format!("Failed to write config to {}", path.display()))?;
            println!("Wrote configuration to {}", path.display());
        }
        None => {
            let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
            print!("{}", yaml);
        }
    }
    Ok(())
}
