//! Process command - extract transactions from a single statement file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use bankscan_core::{
    DocumentKind, ModelClient, ModelError, PaddleBackend, ParseResult, Pipeline, ProcessOptions,
    ProgressEvent, ScanConfig, ScanError, StrategyKind, StrategyPreference, TxKind,
};

/// Upload boundary: statements larger than this are rejected before the
/// pipeline runs.
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input file (PDF, TXT, DOCX, or image)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Send the document straight to the model-assisted extractor
    #[arg(long, conflicts_with = "offline")]
    ai: bool,

    /// Never call the model endpoint (heuristic extraction only)
    #[arg(long)]
    offline: bool,

    /// OCR model directory
    #[arg(short, long)]
    model_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text summary
    Text,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let kind = detect_kind(&args.input)?;
    check_size(&args.input)?;

    let bytes = fs::read(&args.input)?;
    let pipeline = build_pipeline(config, args.offline, args.ai, args.model_dir.as_deref())?;

    let strategy = if args.ai {
        StrategyPreference::AiPreferred
    } else if args.offline {
        StrategyPreference::HeuristicOnly
    } else {
        StrategyPreference::Auto
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let pb = progress_bar();
    let pb_task = tokio::spawn(render_progress(rx, pb.clone()));

    let options = ProcessOptions {
        strategy,
        cancel,
        progress: Some(tx),
    };

    let outcome = pipeline.process(&bytes, kind, &options).await;
    drop(options);
    let _ = pb_task.await;
    pb.finish_and_clear();

    let result = match outcome {
        Ok(result) => result,
        Err(ScanError::Cancelled) => {
            eprintln!("{} Processing cancelled", style("✗").red());
            std::process::exit(130);
        }
        Err(e) => anyhow::bail!("processing failed: {e}"),
    };

    if !result.errors.is_empty() {
        eprintln!("{}", style("Errors:").yellow());
        for error in &result.errors {
            eprintln!("  - {error}");
        }
    }

    let output = format_result(&result, args.format)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} {} transactions written to {}",
            style("✓").green(),
            result.total_processed,
            output_path.display()
        );
    } else {
        println!("{output}");
    }

    debug!("total processing time: {:?}", start.elapsed());

    Ok(())
}

pub fn load_config(config_path: Option<&str>) -> anyhow::Result<ScanConfig> {
    Ok(match config_path {
        Some(path) => ScanConfig::from_file(Path::new(path))?,
        None => ScanConfig::default(),
    })
}

/// Upload-boundary extension allow-list.
pub fn detect_kind(path: &Path) -> anyhow::Result<DocumentKind> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    DocumentKind::from_extension(&extension).ok_or_else(|| {
        anyhow::Error::new(ScanError::Unsupported(format!(
            "file extension '{extension}'"
        )))
    })
}

/// Upload-boundary size cap, checked before any bytes are read.
pub fn check_size(path: &Path) -> anyhow::Result<()> {
    let size = fs::metadata(path)?.len();
    if size > MAX_UPLOAD_BYTES {
        anyhow::bail!(
            "File size exceeds {} MB limit",
            MAX_UPLOAD_BYTES / (1024 * 1024)
        );
    }
    Ok(())
}

/// Wire up the pipeline with whatever capabilities are available.
pub fn build_pipeline(
    mut config: ScanConfig,
    offline: bool,
    require_model: bool,
    model_dir: Option<&Path>,
) -> anyhow::Result<Pipeline> {
    if let Some(dir) = model_dir {
        config.ocr.model_dir = dir.to_path_buf();
    }

    let mut pipeline = Pipeline::new(config.clone());

    match PaddleBackend::from_config(&config.ocr) {
        Ok(backend) => pipeline = pipeline.with_ocr_backend(Arc::new(backend)),
        Err(e) => {
            debug!("OCR backend unavailable: {e}");
        }
    }

    if !offline {
        match ModelClient::from_config(&config.ai) {
            Ok(client) => pipeline = pipeline.with_model_client(client),
            Err(ModelError::MissingApiKey) if require_model => {
                anyhow::bail!(
                    "model-assisted extraction needs an API key; set ANTHROPIC_API_KEY or ai.api_key in the config"
                );
            }
            Err(e) => warn!("model endpoint disabled: {e}"),
        }
    }

    Ok(pipeline)
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

async fn render_progress(mut rx: mpsc::UnboundedReceiver<ProgressEvent>, pb: ProgressBar) {
    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::AcquisitionStarted => pb.set_message("Reading document..."),
            ProgressEvent::TextExtracted { chars } => {
                pb.set_message(format!("Extracted text layer ({chars} chars)"))
            }
            ProgressEvent::OcrStarted { pages } => pb.set_message(format!(
                "Statement appears to be scanned, running OCR on {pages} page(s)... this may take a few minutes"
            )),
            ProgressEvent::OcrPage { page, total, percent } => {
                pb.set_message(format!("Running OCR on page {page}/{total}... {percent}%"))
            }
            ProgressEvent::OcrCompleted => pb.set_message("OCR complete"),
            ProgressEvent::StrategySelected(StrategyKind::Heuristic) => {
                pb.set_message("Parsing transactions...")
            }
            ProgressEvent::StrategySelected(StrategyKind::AiAssisted) => {
                pb.set_message("Preparing model request...")
            }
            ProgressEvent::ModelRequestStarted => pb.set_message("Waiting for the model..."),
            ProgressEvent::Completed { transactions } => {
                pb.set_message(format!("Found {transactions} transactions"))
            }
        }
    }
}

pub fn format_result(result: &ParseResult, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(result)?),
        OutputFormat::Csv => format_csv(result),
        OutputFormat::Text => Ok(format_text(result)),
    }
}

fn format_csv(result: &ParseResult) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "date",
        "description",
        "amount",
        "type",
        "balance",
        "source",
        "uploadedAt",
    ])?;

    for tx in &result.transactions {
        wtr.write_record([
            tx.date.to_string().as_str(),
            tx.description.as_str(),
            tx.amount.to_string().as_str(),
            kind_label(tx.kind),
            tx.balance.to_string().as_str(),
            source_label(tx),
            tx.uploaded_at.to_rfc3339().as_str(),
        ])?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_text(result: &ParseResult) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "Parsed {} transactions\n\n",
        result.total_processed
    ));

    for tx in &result.transactions {
        output.push_str(&format!(
            "{} | {:<24} | {:>12} | {}\n",
            tx.date,
            tx.description,
            tx.amount.to_string(),
            kind_label(tx.kind)
        ));
    }

    output
}

fn kind_label(kind: TxKind) -> &'static str {
    match kind {
        TxKind::Deposit => "deposit",
        TxKind::Withdrawal => "withdrawal",
    }
}

fn source_label(tx: &bankscan_core::Transaction) -> &'static str {
    match tx.source {
        bankscan_core::BankSource::Boc => "BOC",
        bankscan_core::BankSource::Hsbc => "HSBC",
        bankscan_core::BankSource::Scb => "SCB",
    }
}
