//! Commands that act on stored receipts.

use chrono::NaiveDate;
use clap::{Args, Subcommand};
use console::style;
use rust_decimal::Decimal;

use kabala_core::duplicate::similarity_percent;
use kabala_core::extract::rules::parse_date;
use kabala_core::{DuplicateCandidate, FieldName, Patch, ReceiptUpdate};

use super::output::Renderer;
use super::{Context, OutputFormat};

#[derive(Args)]
pub struct IdArgs {
    /// Receipt id
    id: String,
}

#[derive(Args)]
pub struct ShowArgs {
    /// Receipt id
    id: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,
}

/// Field values to set or clear.
#[derive(Args)]
pub struct EditArgs {
    /// Receipt id
    id: String,

    #[arg(long)]
    vendor: Option<String>,

    #[arg(long)]
    tax_id: Option<String>,

    #[arg(long)]
    document_number: Option<String>,

    /// Document date (dd/mm/yyyy or yyyy-mm-dd)
    #[arg(long, value_parser = parse_date_arg)]
    date: Option<NaiveDate>,

    /// Total amount including tax
    #[arg(long)]
    total: Option<Decimal>,

    #[arg(long)]
    tax: Option<Decimal>,

    #[arg(long)]
    pre_tax: Option<Decimal>,

    /// Category id
    #[arg(long)]
    category: Option<i64>,

    #[arg(long)]
    notes: Option<String>,

    /// Clear a field (repeatable), e.g. --clear notes
    #[arg(long, value_parser = parse_field_arg)]
    clear: Vec<FieldName>,
}

#[derive(Args)]
pub struct SearchArgs {
    /// Free text query
    query: String,

    /// Maximum number of results
    #[arg(short, long)]
    limit: Option<usize>,
}

#[derive(Args)]
pub struct CheckDuplicateArgs {
    #[arg(long)]
    vendor: Option<String>,

    /// Document date (dd/mm/yyyy or yyyy-mm-dd)
    #[arg(long, value_parser = parse_date_arg)]
    date: Option<NaiveDate>,

    /// Total amount
    #[arg(long)]
    amount: Option<Decimal>,
}

#[derive(Args)]
pub struct DuplicateArgs {
    #[command(subcommand)]
    command: DuplicateCommand,
}

#[derive(Subcommand)]
enum DuplicateCommand {
    /// Mark a receipt as a duplicate of another one
    Mark {
        /// Receipt id
        id: String,
        /// Id of the original receipt
        #[arg(long)]
        of: String,
    },

    /// Return a duplicate to review
    Dismiss {
        /// Receipt id
        id: String,
    },
}

impl EditArgs {
    fn to_update(&self) -> anyhow::Result<ReceiptUpdate> {
        fn patch<T: Clone>(value: &Option<T>, field: FieldName, clear: &[FieldName]) -> anyhow::Result<Patch<T>> {
            match (value, clear.contains(&field)) {
                (Some(_), true) => anyhow::bail!("--clear {} conflicts with a new value", field),
                (Some(v), false) => Ok(Patch::Set(v.clone())),
                (None, true) => Ok(Patch::Clear),
                (None, false) => Ok(Patch::Keep),
            }
        }

        let clear = &self.clear;
        Ok(ReceiptUpdate {
            vendor_name: patch(&self.vendor, FieldName::VendorName, clear)?,
            tax_id: patch(&self.tax_id, FieldName::TaxId, clear)?,
            document_number: patch(&self.document_number, FieldName::DocumentNumber, clear)?,
            document_date: patch(&self.date, FieldName::DocumentDate, clear)?,
            total_amount: patch(&self.total, FieldName::TotalAmount, clear)?,
            tax_amount: patch(&self.tax, FieldName::TaxAmount, clear)?,
            pre_tax_amount: patch(&self.pre_tax, FieldName::PreTaxAmount, clear)?,
            category_id: patch(&self.category, FieldName::Category, clear)?,
            notes: patch(&self.notes, FieldName::Notes, clear)?,
        })
    }
}

fn parse_date_arg(s: &str) -> Result<NaiveDate, String> {
    parse_date(s).ok_or_else(|| format!("invalid date: {}", s))
}

fn parse_field_arg(s: &str) -> Result<FieldName, String> {
    FieldName::parse(s)
        .filter(|f| *f != FieldName::Status)
        .ok_or_else(|| format!("unknown field: {}", s))
}

fn renderer(ctx: &Context) -> Renderer<'_> {
    Renderer::new(
        &ctx.service.config().extraction.currency_symbol,
        ctx.service.catalog(),
    )
}

pub fn show(args: ShowArgs, ctx: &Context) -> anyhow::Result<()> {
    let receipt = ctx.service.get(&ctx.user, &args.id)?;

    match args.format {
        OutputFormat::Text => {
            let report = ctx.service.validate(&receipt);
            print!("{}", renderer(ctx).receipt(&receipt, &report));
        }
        format => println!("{}", renderer(ctx).receipts(&[receipt], format)?),
    }

    Ok(())
}

pub fn edit(args: EditArgs, ctx: &Context) -> anyhow::Result<()> {
    let update = args.to_update()?;
    if update.is_empty() {
        anyhow::bail!("Nothing to change; pass at least one field option");
    }

    let reviewed = ctx.service.update(&ctx.user, &args.id, update)?;
    print!("{}", renderer(ctx).receipt(&reviewed.receipt, &reviewed.report));

    Ok(())
}

pub fn approve(args: EditArgs, ctx: &Context) -> anyhow::Result<()> {
    let update = args.to_update()?;
    let receipt = ctx.service.approve(&ctx.user, &args.id, update)?;

    println!(
        "{} Approved receipt {}",
        style("✓").green(),
        receipt.id
    );

    Ok(())
}

pub async fn retry(args: IdArgs, ctx: &Context) -> anyhow::Result<()> {
    let receipt = ctx.service.retry(&ctx.user, &args.id)?.wait().await?;
    let report = ctx.service.validate(&receipt);
    print!("{}", renderer(ctx).receipt(&receipt, &report));

    Ok(())
}

pub fn delete(args: IdArgs, ctx: &Context) -> anyhow::Result<()> {
    let receipt = ctx.service.delete(&ctx.user, &args.id)?;

    println!(
        "{} Deleted receipt {} ({})",
        style("✓").green(),
        receipt.id,
        receipt.artifact.reference
    );

    Ok(())
}

pub fn history(args: IdArgs, ctx: &Context) -> anyhow::Result<()> {
    let entries = ctx.service.get_history(&ctx.user, &args.id)?;

    if entries.is_empty() {
        println!("{} No edits recorded", style("ℹ").blue());
    } else {
        print!("{}", renderer(ctx).history(&entries));
    }

    Ok(())
}

pub fn search(args: SearchArgs, ctx: &Context) -> anyhow::Result<()> {
    let hits = ctx.service.search(&ctx.user, &args.query, args.limit)?;

    if hits.is_empty() {
        println!("{} No receipts matched", style("ℹ").blue());
        return Ok(());
    }

    let renderer = renderer(ctx);
    for hit in hits {
        let receipt = ctx.service.get(&ctx.user, &hit.receipt_id)?;
        println!(
            "{:>4}  {:<16} {}",
            hit.score,
            hit.matched_field.as_str(),
            renderer.summary_line(&receipt)
        );
    }

    Ok(())
}

pub fn check_duplicate(args: CheckDuplicateArgs, ctx: &Context) -> anyhow::Result<()> {
    let candidate = DuplicateCandidate {
        receipt_id: None,
        vendor_name: args.vendor,
        date: args.date,
        amount: args.amount,
    };
    let verdict = ctx.service.check_duplicate(&ctx.user, &candidate)?;

    match (&verdict.matched_receipt_id, verdict.is_duplicate) {
        (Some(id), true) => println!(
            "{} Duplicate of {} ({}% similar)",
            style("!").yellow(),
            id,
            similarity_percent(verdict.similarity)
        ),
        (Some(id), false) => println!(
            "{} Not a duplicate; closest is {} ({}% similar)",
            style("✓").green(),
            id,
            similarity_percent(verdict.similarity)
        ),
        (None, _) => println!("{} No similar receipts", style("✓").green()),
    }

    Ok(())
}

pub fn duplicate(args: DuplicateArgs, ctx: &Context) -> anyhow::Result<()> {
    let receipt = match args.command {
        DuplicateCommand::Mark { id, of } => ctx.service.mark_duplicate(&ctx.user, &id, &of)?,
        DuplicateCommand::Dismiss { id } => ctx.service.dismiss_duplicate(&ctx.user, &id)?,
    };

    println!(
        "{} Receipt {} is now {}",
        style("✓").green(),
        receipt.id,
        receipt.status.display_label()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(clear: Vec<FieldName>) -> EditArgs {
        EditArgs {
            id: "r1".to_string(),
            vendor: Some("Cafe Cafe".to_string()),
            tax_id: None,
            document_number: None,
            date: None,
            total: None,
            tax: None,
            pre_tax: None,
            category: Some(3),
            notes: None,
            clear,
        }
    }

    #[test]
    fn test_edit_args_to_update() {
        let update = args(vec![FieldName::Notes]).to_update().unwrap();
        assert_eq!(update.vendor_name, Patch::Set("Cafe Cafe".to_string()));
        assert_eq!(update.category_id, Patch::Set(3));
        assert_eq!(update.notes, Patch::Clear);
        assert_eq!(update.total_amount, Patch::Keep);
    }

    #[test]
    fn test_clear_conflicts_with_value() {
        assert!(args(vec![FieldName::VendorName]).to_update().is_err());
    }

    #[test]
    fn test_date_arg_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15);
        assert_eq!(parse_date_arg("15/03/2024").ok(), expected);
        assert_eq!(parse_date_arg("2024-03-15").ok(), expected);
        assert!(parse_date_arg("yesterday").is_err());
        assert!(parse_field_arg("status").is_err());
    }
}
