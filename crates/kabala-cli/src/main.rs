//! CLI application for receipt ingestion and review.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;
use kabala_core::KabalaError;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{Context, config, extract, ingest, receipt};

/// Kabala - extract, review and archive receipts
#[derive(Parser)]
#[command(name = "kabala")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Path to the receipt database
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Acting user
    #[arg(short, long, global = true, default_value = "local")]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract fields from a recognized text file without storing anything
    Extract(extract::ExtractArgs),

    /// Ingest receipt files into the archive
    Ingest(ingest::IngestArgs),

    /// Show one receipt
    Show(receipt::ShowArgs),

    /// Edit receipt fields
    Edit(receipt::EditArgs),

    /// Approve a receipt, optionally with final edits
    Approve(receipt::EditArgs),

    /// Re-run extraction for a failed receipt
    Retry(receipt::IdArgs),

    /// Delete a receipt and its history
    Delete(receipt::IdArgs),

    /// Show the edit history of a receipt
    History(receipt::IdArgs),

    /// Search receipts
    Search(receipt::SearchArgs),

    /// Check whether a receipt would be a duplicate
    CheckDuplicate(receipt::CheckDuplicateArgs),

    /// Mark or dismiss duplicates
    Duplicate(receipt::DuplicateArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install logger: {}", e);
    }

    if let Err(e) = run(cli).await {
        report(&e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();
    let open = || Context::open(config_path, cli.db.as_deref(), &cli.user);

    match cli.command {
        Commands::Extract(args) => extract::run(args, config_path),
        Commands::Config(args) => config::run(args, config_path),
        Commands::Ingest(args) => ingest::run(args, &open()?).await,
        Commands::Show(args) => receipt::show(args, &open()?),
        Commands::Edit(args) => receipt::edit(args, &open()?),
        Commands::Approve(args) => receipt::approve(args, &open()?),
        Commands::Retry(args) => receipt::retry(args, &open()?).await,
        Commands::Delete(args) => receipt::delete(args, &open()?),
        Commands::History(args) => receipt::history(args, &open()?),
        Commands::Search(args) => receipt::search(args, &open()?),
        Commands::CheckDuplicate(args) => receipt::check_duplicate(args, &open()?),
        Commands::Duplicate(args) => receipt::duplicate(args, &open()?),
    }
}

/// Print an error, preferring the library's user-facing message.
fn report(error: &anyhow::Error) {
    match error.downcast_ref::<KabalaError>() {
        Some(e) => {
            eprintln!("{} {}", style("✗").red(), e.user_message());
            eprintln!("  {} ({})", style(e.to_string()).dim(), e.code());
        }
        None => eprintln!("{} {:#}", style("✗").red(), error),
    }
}
