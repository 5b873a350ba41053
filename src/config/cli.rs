use crate::core::entries::EntryKind;
use crate::core::ledger::ValuationMethod;
use crate::domain::report::{ReportFormat, ReportKind};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "small-inventory")]
#[command(about = "Inventory management on top of an Excel workbook", version)]
pub struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, global = true, default_value = "inventory.toml")]
    pub config: PathBuf,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Log CPU and memory usage per report phase
    #[arg(long, global = true)]
    pub monitor: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Verify the workbook, configuration and directories
    Check,

    /// Print inventory KPIs and stock status
    Summary,

    /// Generate report files into the exports directory
    Report(ReportArgs),

    /// Append one entry to the workbook
    Record(RecordArgs),

    /// Manage workbook backups
    #[command(subcommand)]
    Backup(BackupCommand),

    /// Write a blank workbook with every sheet and product row
    Template {
        /// Output path; defaults to the configured workbook
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Run the web dashboard
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Debug, clap::Args)]
pub struct ReportArgs {
    /// Report kinds, e.g. stock_summary,sales (default: all)
    #[arg(short, long, value_delimiter = ',')]
    pub kind: Vec<ReportKind>,

    /// Output formats: xlsx, csv, json, html (default: [export] formats)
    #[arg(short, long, value_delimiter = ',')]
    pub format: Vec<ReportFormat>,

    /// Period start (YYYY-MM-DD)
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Period end (YYYY-MM-DD)
    #[arg(long)]
    pub to: Option<NaiveDate>,

    /// Bundle every file into one ZIP archive
    #[arg(long)]
    pub zip: bool,

    /// current or weighted_average
    #[arg(long, default_value = "current")]
    pub valuation: ValuationMethod,
}

#[derive(Debug, clap::Args)]
pub struct RecordArgs {
    /// opening, sale, purchase, production, return or adjustment
    pub kind: EntryKind,

    /// Form fields as key=value, e.g. -f product=1.0kg -f quantity=12
    #[arg(short = 'f', long = "field", value_parser = parse_key_val)]
    pub fields: Vec<(String, String)>,
}

#[derive(Debug, Subcommand)]
pub enum BackupCommand {
    /// Copy the workbook now
    Create {
        #[arg(short, long, default_value = "Manual backup")]
        description: String,
    },
    /// Zip the workbook, data files, config and recent logs
    Full,
    /// List backups, newest first
    List,
    /// Replace the workbook with a backup (the current one is saved first)
    Restore { name: String },
    Delete { name: String },
    /// Check that a backup can be opened
    Verify { name: String },
    /// Remove the oldest backups beyond [backup] max_backups
    Cleanup,
    Stats,
    /// Print the backup list as CSV
    Log,
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing field name in '{}'", raw));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_report_command() {
        let cli = Cli::parse_from([
            "small-inventory",
            "report",
            "--kind",
            "stock_summary,sales",
            "--format",
            "csv",
            "--from",
            "2025-06-01",
            "--zip",
        ]);
        match cli.command {
            Command::Report(args) => {
                assert_eq!(args.kind, vec![ReportKind::StockSummary, ReportKind::Sales]);
                assert_eq!(args.format, vec![ReportFormat::Csv]);
                assert_eq!(args.from, NaiveDate::from_ymd_opt(2025, 6, 1));
                assert!(args.zip);
                assert_eq!(args.valuation, ValuationMethod::Current);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.config, PathBuf::from("inventory.toml"));
    }

    #[test]
    fn test_parse_record_fields() {
        let cli = Cli::parse_from([
            "small-inventory",
            "--verbose",
            "record",
            "sale",
            "-f",
            "product=1.0kg",
            "--field",
            "quantity = 12",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Command::Record(args) => {
                assert_eq!(args.kind, EntryKind::Sale);
                assert_eq!(
                    args.fields,
                    vec![
                        ("product".to_string(), "1.0kg".to_string()),
                        ("quantity".to_string(), "12".to_string()),
                    ]
                );
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_field_without_equals_is_rejected() {
        assert!(parse_key_val("quantity").is_err());
        assert!(parse_key_val("=5").is_err());
    }
}
