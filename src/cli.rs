use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Verify duplicated records against their sources", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compare two CSV extracts of one table
    Compare(CompareArgs),
    /// Snapshot every configured table of one record
    Capture(CaptureArgs),
    /// Snapshot, duplicate, and locate the duplicate of each source record
    Activate(ActivateArgs),
    /// Compare each duplicate with its source and report per record and product
    Reconcile(ReconcileArgs),
    /// Dump every configured table of one record to CSV files
    Extract(ExtractArgs),
}

/// Options shared by commands that read the record store.
#[derive(Debug, Args)]
pub struct StoreArgs {
    /// Directory holding one `<table>.csv` export per table
    #[arg(short = 'd', long = "data")]
    pub data: PathBuf,
    /// YAML configuration (tables, exclusions, lookup, retry policies)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// CSV delimiter of the table exports (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the table exports (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct CompareArgs {
    /// CSV extract of the source record
    #[arg(short = 's', long = "source")]
    pub source: PathBuf,
    /// CSV extract of the duplicate
    #[arg(short = 't', long = "target")]
    pub target: PathBuf,
    /// Table identifier used to pick exclusion rules
    #[arg(long = "table")]
    pub table: String,
    /// YAML configuration providing exclusion rules
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Ignore the configured exclusions and compare every shared column
    #[arg(long = "no-exclusions")]
    pub no_exclusions: bool,
    /// Print the comparison as JSON
    #[arg(long)]
    pub json: bool,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct CaptureArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// Directory receiving snapshot files
    #[arg(long = "snapshots")]
    pub snapshots: PathBuf,
    /// External reference of the record to capture
    #[arg(short = 'r', long = "reference")]
    pub reference: String,
}

#[derive(Debug, Args)]
pub struct ActivateArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// Directory receiving snapshot files
    #[arg(long = "snapshots")]
    pub snapshots: PathBuf,
    /// CSV listing the source references (`source_reference` column or first column)
    #[arg(long = "sources")]
    pub sources: PathBuf,
    /// Activation mapping to write
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
    /// Prefix of the simulated duplicate references
    #[arg(long = "target-prefix", default_value = "999")]
    pub target_prefix: String,
    /// Trailing characters of the source reference kept in the duplicate reference
    #[arg(long = "keep-digits", default_value_t = 6)]
    pub keep_digits: usize,
    /// Character encoding of the written mapping (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ReconcileArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// Directory holding snapshot files
    #[arg(long = "snapshots")]
    pub snapshots: PathBuf,
    /// Activation mapping (`source_reference`, `target_reference`, optional `status`)
    #[arg(short = 'm', long = "mapping")]
    pub mapping: PathBuf,
    /// Delimiter of the mapping file (defaults to the file extension rule)
    #[arg(long = "mapping-delimiter", value_parser = parse_delimiter)]
    pub mapping_delimiter: Option<u8>,
    /// Directory receiving the detailed report and the product summary
    #[arg(short = 'o', long = "output-dir")]
    pub output_dir: PathBuf,
    /// Character encoding of the reports (defaults to utf-8 with byte-order mark)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// External reference of the record to extract
    #[arg(short = 'r', long = "reference")]
    pub reference: String,
    /// Directory receiving one CSV file per table
    #[arg(short = 'o', long = "output-dir")]
    pub output_dir: PathBuf,
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
