//! Extract command - pull fields out of a recognized text file.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use kabala_core::confidence::overall_confidence;
use kabala_core::{
    ConfidenceScorer, FieldName, FieldValidator, ReceiptFields, ReceiptParser, ValidationWarning,
};

use super::output::{Renderer, csv_value};
use super::{OutputFormat, load_config};

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Text file with the recognized receipt text
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Override the tax rate (e.g. 0.18)
    #[arg(long)]
    tax_rate: Option<Decimal>,

    /// Print validation warnings to stderr
    #[arg(long)]
    validate: bool,
}

#[derive(Serialize)]
struct ExtractReport {
    fields: ReceiptFields,
    confidence: BTreeMap<FieldName, f32>,
    overall_confidence: Option<f32>,
    warnings: Vec<ValidationWarning>,
    extraction: serde_json::Value,
}

pub fn run(args: ExtractArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }
    info!("Extracting fields from {}", args.input.display());

    let text = fs::read_to_string(&args.input)?;

    let mut parser = ReceiptParser::new(&config.extraction);
    if let Some(rate) = args.tax_rate {
        parser = parser.with_tax_rate(rate);
    }
    let extraction = parser.parse(&text);

    let scorer = ConfidenceScorer::new(&config.confidence, config.validation.tax_tolerance);
    let confidence = scorer.score_extraction(&extraction);
    let fields = extraction.fields();
    let report = FieldValidator::new(&config.validation).validate(&fields, &confidence);

    if args.validate && !report.is_valid() {
        eprintln!("{}", style("Validation issues:").yellow());
        for message in report.messages() {
            eprintln!("  - {}", message);
        }
    }

    let catalog = config.category_catalog();
    let renderer = Renderer::new(&config.extraction.currency_symbol, &catalog);

    let output = match args.format {
        OutputFormat::Json => serde_json::to_string_pretty(&ExtractReport {
            overall_confidence: overall_confidence(&confidence),
            extraction: extraction.to_payload(),
            warnings: report.warnings.clone(),
            fields: fields.clone(),
            confidence: confidence.clone(),
        })?,
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(vec![]);
            let mut header: Vec<&str> = FieldName::EXTRACTED.iter().map(|f| f.as_str()).collect();
            header.push("overall_confidence");
            wtr.write_record(&header)?;

            let mut record: Vec<String> = FieldName::EXTRACTED
                .iter()
                .map(|f| csv_value(&fields, *f))
                .collect();
            record.push(
                overall_confidence(&confidence)
                    .map(|c| format!("{:.2}", c))
                    .unwrap_or_default(),
            );
            wtr.write_record(&record)?;
            String::from_utf8(wtr.into_inner()?)?
        }
        OutputFormat::Text => {
            let mut out = renderer.fields(&fields, &confidence);
            if let Some(overall) = overall_confidence(&confidence) {
                out.push_str(&format!("  {:<16} {:.0}%\n", "confidence", overall * 100.0));
            }
            out
        }
    };

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    debug!("Extraction took {:?}", start.elapsed());

    Ok(())
}
