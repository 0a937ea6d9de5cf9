use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Load service report CSV exports into a warehouse table exactly once",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create an empty table with the service report columns
    Init(TableArgs),
    /// Reconcile, normalize, and append a CSV export to a table
    Ingest(IngestArgs),
    /// Show the table's current UserServiceId watermark
    Status(TableArgs),
    /// List the table's columns and types
    Schema(TableArgs),
    /// List the distinct creators stored in a table
    Creators(TableArgs),
    /// Filter stored rows, optionally with running balance and grand total
    Report(ReportArgs),
    /// Print the built-in ingestion profile as YAML
    Profile(ProfileArgs),
}

#[derive(Debug, Args)]
pub struct TableArgs {
    /// Warehouse directory holding the table files
    #[arg(short = 'w', long = "warehouse")]
    pub warehouse: PathBuf,
    /// Table name (letters, digits, underscores)
    #[arg(short = 't', long = "table")]
    pub table: String,
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// CSV export to ingest (`-` for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    #[command(flatten)]
    pub target: TableArgs,
    /// YAML profile overriding column aliases and erased columns
    #[arg(long)]
    pub profile: Option<PathBuf>,
    /// Take the column order from the table's stored schema
    #[arg(long = "dynamic-schema")]
    pub dynamic_schema: bool,
    /// Continue with a watermark of 0 (with a warning) when it cannot be read
    #[arg(long = "assume-empty-on-error")]
    pub assume_empty_on_error: bool,
    /// Filter and report without appending; ready rows go to --output or stdout
    #[arg(long = "dry-run")]
    pub dry_run: bool,
    /// Print the first N ready rows as a table
    #[arg(long)]
    pub preview: Option<usize>,
    /// Destination for ready rows in dry-run mode
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Warehouse directory holding the table files
    #[arg(short = 'w', long = "warehouse")]
    pub warehouse: PathBuf,
    /// Tables to read, in lookup priority order (repeatable)
    #[arg(short = 't', long = "table", required = true, action = clap::ArgAction::Append)]
    pub tables: Vec<String>,
    /// Creators to include (repeatable or comma-separated)
    #[arg(short = 'c', long = "creator", value_delimiter = ',')]
    pub creators: Vec<String>,
    /// UserServiceId condition: =N, >=N, <=N, >N, <N, or N..M
    #[arg(long = "id", allow_hyphen_values = true)]
    pub id: Option<String>,
    /// Only rows created on this day (YYYY-MM-DD)
    #[arg(long, conflicts_with = "date_between")]
    pub date: Option<String>,
    /// Only rows created within START,END inclusive (YYYY-MM-DD,YYYY-MM-DD)
    #[arg(long = "date-between")]
    pub date_between: Option<String>,
    /// Order by creation date and add RunningBalance and a grand total row
    #[arg(long)]
    pub summary: bool,
    /// Write the report as CSV instead of printing a table (`-` for stdout)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// CSV delimiter for the exported report
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding for the exported report (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ProfileArgs {
    /// Validate this profile file and print it with defaults filled in
    #[arg(long)]
    pub check: Option<PathBuf>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
