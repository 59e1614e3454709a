//! Ingest command - add receipt files to the archive.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use kabala_core::{Artifact, Receipt, ReceiptStatus};

use super::output::Renderer;
use super::{Context, OutputFormat};

/// Arguments for the ingest command.
#[derive(Args)]
pub struct IngestArgs {
    /// Input files or glob patterns
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Output format for the ingested receipts
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Hide the progress bar
    #[arg(short, long)]
    quiet: bool,
}

pub async fn run(args: IngestArgs, ctx: &Context) -> anyhow::Result<()> {
    let start = Instant::now();

    let files = expand_inputs(&args.inputs)?;
    if files.is_empty() {
        anyhow::bail!("No matching files found for: {}", args.inputs.join(" "));
    }

    let pb = if args.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(files.len() as u64)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} receipts")?
            .progress_chars("=>-"),
    );

    // Every file is registered first so extraction runs concurrently
    let mut handles = Vec::with_capacity(files.len());
    for path in &files {
        let handle = ctx.service.create(&ctx.user, artifact_for(path))?;
        debug!("Queued {} as {}", path.display(), handle.receipt_id);
        handles.push(handle);
    }

    let mut receipts: Vec<Receipt> = Vec::with_capacity(handles.len());
    for handle in handles {
        let receipt = handle.wait().await?;
        if receipt.status == ReceiptStatus::Failed {
            warn!(
                "Receipt {} failed: {}",
                receipt.id,
                receipt.processing_error.as_deref().unwrap_or_default()
            );
        }
        receipts.push(receipt);
        pb.inc(1);
    }
    pb.finish_and_clear();

    let config = ctx.service.config();
    let renderer = Renderer::new(&config.extraction.currency_symbol, ctx.service.catalog());
    println!("{}", renderer.receipts(&receipts, args.format)?);

    let failed = receipts
        .iter()
        .filter(|r| r.status == ReceiptStatus::Failed)
        .count();
    let duplicates = receipts
        .iter()
        .filter(|r| r.status == ReceiptStatus::Duplicate)
        .count();

    eprintln!();
    eprintln!(
        "{} Ingested {} receipts in {:?}",
        style("✓").green(),
        receipts.len(),
        start.elapsed()
    );
    if duplicates > 0 {
        eprintln!("{} {} possible duplicates", style("!").yellow(), duplicates);
    }
    if failed > 0 {
        eprintln!(
            "{} {} failed (run 'kabala retry <id>' to try again)",
            style("✗").red(),
            failed
        );
    }

    Ok(())
}

/// Expand glob patterns; plain paths are taken as they are.
fn expand_inputs(inputs: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        let matches: Vec<PathBuf> = glob(input)?
            .filter_map(|r| r.ok())
            .filter(|p| p.is_file())
            .collect();

        if matches.is_empty() && Path::new(input).is_file() {
            files.push(PathBuf::from(input));
        } else {
            files.extend(matches);
        }
    }
    files.dedup();
    Ok(files)
}

fn artifact_for(path: &Path) -> Artifact {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let content_type = match extension.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "pdf" => Some("application/pdf"),
        "txt" => Some("text/plain"),
        _ => None,
    };

    Artifact {
        reference: path.to_string_lossy().into_owned(),
        filename: path.file_name().map(|n| n.to_string_lossy().into_owned()),
        size_bytes: std::fs::metadata(path).ok().map(|m| m.len()),
        content_type: content_type.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_for_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.TXT");
        std::fs::write(&path, "Total: 10.00").unwrap();

        let artifact = artifact_for(&path);
        assert_eq!(artifact.filename.as_deref(), Some("scan.TXT"));
        assert_eq!(artifact.size_bytes, Some(12));
        assert_eq!(artifact.content_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn test_expand_inputs_with_glob() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.txt", "b.txt", "c.jpg"] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }

        let pattern = dir.path().join("*.txt").to_string_lossy().into_owned();
        let files = expand_inputs(&[pattern]).unwrap();
        assert_eq!(files.len(), 2);
    }
}
