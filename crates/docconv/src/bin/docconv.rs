//! Command-line front end: one-shot conversion or a batch run through the
//! full service.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};

use docconv::format::guess_mime;
use docconv::{
    load_config, logging, ConversionService, ConvertStatus, ProcessorRegistry, SourceDocument,
    UploadRequest,
};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(name = "docconv", version, about = "Convert documents to Markdown")]
struct Cli {
    /// Log level used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a single file without touching any storage.
    Convert {
        file: PathBuf,

        /// MIME type; guessed from the extension when omitted.
        #[arg(long)]
        mime: Option<String>,

        /// Write Markdown here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// JSON config for PDF and table settings.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Upload files, convert them through the worker pool and report results.
    Batch {
        #[arg(long)]
        config: PathBuf,

        #[arg(long, default_value_t = 1)]
        project: i64,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.json_logs).context("failed to initialise logging")?;

    match cli.command {
        Command::Convert {
            file,
            mime,
            output,
            config,
        } => convert_one(&file, mime, output.as_deref(), config.as_deref()),
        Command::Batch {
            config,
            project,
            files,
        } => run_batch(&config, project, &files),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

fn convert_one(
    file: &Path,
    mime: Option<String>,
    output: Option<&Path>,
    config: Option<&Path>,
) -> Result<()> {
    let registry = match config {
        Some(path) => ProcessorRegistry::from_config(
            &load_config(path).with_context(|| format!("loading {}", path.display()))?,
        ),
        None => ProcessorRegistry::new(&Default::default(), Default::default()),
    };

    let bytes = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let filename = file_name(file);
    let mime = mime.unwrap_or_else(|| guess_mime(&filename));
    let source = SourceDocument::new(&filename, &mime, bytes.len() as u64);

    let markdown = registry.dispatch(&source, &bytes, Utc::now());
    match output {
        Some(path) => std::fs::write(path, markdown)
            .with_context(|| format!("writing {}", path.display()))?,
        None => print!("{}", markdown),
    }
    Ok(())
}

fn run_batch(config_path: &Path, project: i64, files: &[PathBuf]) -> Result<()> {
    let config = load_config(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let service = ConversionService::from_config(&config).context("starting conversion service")?;

    let mut pending = Vec::new();
    let mut rejected = 0usize;
    for path in files {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let upload = service.upload(UploadRequest {
            project_id: project,
            filename: file_name(path),
            mime_type: String::new(),
            uploaded_by: 0,
            bytes,
        });
        let receipt = match upload {
            Ok(receipt) => receipt,
            Err(e) => {
                eprintln!("{}: {}", path.display(), e);
                rejected += 1;
                continue;
            }
        };
        match service.start_convert(receipt.document_id) {
            Ok(_) => pending.push((path.clone(), receipt.document_id)),
            Err(e) => {
                eprintln!("{}: {}", path.display(), e);
                rejected += 1;
            }
        }
    }

    // every attempt ends by its deadline, so this loop terminates
    let limit = service.timeout() + Duration::from_secs(5);
    let started = Instant::now();
    let mut completed = 0usize;
    let mut failed = 0usize;
    while !pending.is_empty() {
        if started.elapsed() > limit {
            bail!("{} conversions did not finish in time", pending.len());
        }
        let mut still_running = Vec::new();
        for (path, id) in pending {
            let view = service.get_convert_status(id)?;
            match view.status {
                ConvertStatus::Completed => {
                    completed += 1;
                    println!(
                        "ok      {} -> {}",
                        path.display(),
                        view.converted_filename.unwrap_or_default()
                    );
                }
                ConvertStatus::Failed => {
                    failed += 1;
                    println!(
                        "failed  {}: {}",
                        path.display(),
                        view.error.unwrap_or_default()
                    );
                }
                _ => still_running.push((path, id)),
            }
        }
        pending = still_running;
        if !pending.is_empty() {
            thread::sleep(POLL_INTERVAL);
        }
    }

    service.shutdown();
    println!(
        "{} completed, {} failed, {} rejected",
        completed, failed, rejected
    );
    if failed + rejected > 0 {
        bail!("{} of {} files were not converted", failed + rejected, files.len());
    }
    Ok(())
}
