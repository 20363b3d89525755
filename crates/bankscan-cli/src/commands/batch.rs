//! Batch processing command for multiple statement files.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error};

use bankscan_core::{ProcessOptions, StrategyPreference};

use super::process::{
    MAX_UPLOAD_BYTES, OutputFormat, build_pipeline, detect_kind, format_result, load_config,
};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input files or glob pattern
    #[arg(required = true)]
    input: String,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Never call the model endpoint (heuristic extraction only)
    #[arg(long)]
    offline: bool,

    /// OCR model directory
    #[arg(short, long)]
    model_dir: Option<PathBuf>,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let config = load_config(config_path)?;

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| detect_kind(p).is_ok())
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let pipeline = build_pipeline(config, args.offline, false, args.model_dir.as_deref())?;

    let overall_pb = ProgressBar::new(files.len() as u64);
    overall_pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")
            .unwrap()
            .progress_chars("=>-"),
    );

    let strategy = if args.offline {
        StrategyPreference::HeuristicOnly
    } else {
        StrategyPreference::Auto
    };

    let mut total_transactions = 0usize;
    let mut failures = 0usize;

    for path in &files {
        let file_start = Instant::now();

        let outcome = process_single_file(path, &pipeline, strategy, &args).await;
        debug!(
            "{} processed in {:?}",
            path.display(),
            file_start.elapsed()
        );

        match outcome {
            Ok(count) => total_transactions += count,
            Err(e) => {
                failures += 1;
                error!("{}: {e}", path.display());
                if !args.continue_on_error {
                    overall_pb.abandon();
                    anyhow::bail!("failed on {}: {e}", path.display());
                }
            }
        }

        overall_pb.inc(1);
    }

    overall_pb.finish();

    println!(
        "{} Processed {} files: {} transactions, {} failures in {:.1?}",
        style("✓").green(),
        files.len(),
        total_transactions,
        failures,
        start.elapsed()
    );

    Ok(())
}

async fn process_single_file(
    path: &PathBuf,
    pipeline: &bankscan_core::Pipeline,
    strategy: StrategyPreference,
    args: &BatchArgs,
) -> anyhow::Result<usize> {
    let kind = detect_kind(path)?;

    let size = fs::metadata(path)?.len();
    if size > MAX_UPLOAD_BYTES {
        anyhow::bail!("file exceeds the {} MB limit", MAX_UPLOAD_BYTES / (1024 * 1024));
    }

    let bytes = fs::read(path)?;
    let options = ProcessOptions {
        strategy,
        ..Default::default()
    };

    let result = pipeline.process(&bytes, kind, &options).await?;

    if !result.errors.is_empty() {
        anyhow::bail!(result.errors.join("; "));
    }

    if let Some(output_dir) = &args.output_dir {
        let extension = match args.format {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        };
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("statement");
        let output_path = output_dir.join(format!("{stem}.{extension}"));
        fs::write(&output_path, format_result(&result, args.format)?)?;
    } else {
        println!(
            "{}: {} transactions",
            path.display(),
            result.total_processed
        );
    }

    Ok(result.total_processed)
}
