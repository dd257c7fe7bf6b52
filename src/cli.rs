use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::engine::Buffer;

pub const DEFAULT_STATE_DIR: &str = "cost_reconcile_state";

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Reconcile cost spreadsheets against a canonical schema and compute cost formulas",
    long_about = None
)]
pub struct Cli {
    /// Directory holding the saved buffers, manual values and undo history
    #[arg(long = "state-dir", global = true, default_value = DEFAULT_STATE_DIR)]
    pub state_dir: PathBuf,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Read CSV/TSV files into the system (top) or staged (bottom) buffer
    Load(LoadArgs),
    /// Merge the staged buffer into the system buffer
    Import(ImportArgs),
    /// Map system buffer headers onto the canonical schema
    Map,
    /// Compute cost components and formulas for a plant / cost center
    Compute(ComputeArgs),
    /// Print a buffer, optionally filtered by codes or free text
    Show(ShowArgs),
    /// Write a buffer to a CSV/TSV file
    Export(ExportArgs),
    /// Set or list manual values (plant_code, cost_center_code, machine_code, ...)
    Manual(ManualArgs),
    /// Add or delete rows and columns, or change a single cell
    Edit(EditArgs),
    /// Clear one or both buffers
    Reset(ResetArgs),
    /// Revert the most recent change
    Undo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LoadTarget {
    Top,
    Bottom,
}

impl From<LoadTarget> for Buffer {
    fn from(value: LoadTarget) -> Self {
        match value {
            LoadTarget::Top => Buffer::Top,
            LoadTarget::Bottom => Buffer::Bottom,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ViewTarget {
    Top,
    Bottom,
    Processed,
}

impl From<ViewTarget> for Buffer {
    fn from(value: ViewTarget) -> Self {
        match value {
            ViewTarget::Top => Buffer::Top,
            ViewTarget::Bottom => Buffer::Bottom,
            ViewTarget::Processed => Buffer::Processed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResetTarget {
    Top,
    Bottom,
    All,
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    /// Buffer receiving the rows
    #[arg(short, long, value_enum, default_value = "top")]
    pub target: LoadTarget,
    /// Input files
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
    /// Delimiter override (supports ',', 'tab', ';', '|'); sniffed when omitted
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Keep system rows that share a plant / cost center pair with staged rows
    #[arg(long = "no-replace")]
    pub no_replace: bool,
}

#[derive(Debug, Args)]
pub struct ComputeArgs {
    /// Plant code (defaults to the manual plant_code value)
    #[arg(long)]
    pub plant: Option<String>,
    /// Cost center code (defaults to the manual cost_center_code value)
    #[arg(long = "cost-center")]
    pub cost_center: Option<String>,
    /// Formula CSV with name and expression columns
    #[arg(long)]
    pub formulas: Option<PathBuf>,
    /// Also write the computed rows to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    #[arg(short, long, value_enum, default_value = "top")]
    pub target: ViewTarget,
    #[arg(long)]
    pub plant: Option<String>,
    #[arg(long = "cost-center")]
    pub cost_center: Option<String>,
    /// Keep rows where any cell contains this text (case-insensitive)
    #[arg(long)]
    pub search: Option<String>,
    /// Maximum number of rows to print
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[arg(short, long, value_enum, default_value = "top")]
    pub target: ViewTarget,
    /// Destination file ('-' for stdout)
    #[arg(short, long)]
    pub output: PathBuf,
    /// Output delimiter (defaults from the file extension)
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
}

#[derive(Debug, Args)]
pub struct ManualArgs {
    /// Assignments such as plant_code=P1; an empty value clears the key
    #[arg(value_parser = parse_assignment)]
    pub values: Vec<(String, String)>,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    #[arg(short, long, value_enum, default_value = "top")]
    pub target: LoadTarget,
    #[command(subcommand)]
    pub action: EditAction,
}

#[derive(Debug, Subcommand)]
pub enum EditAction {
    /// Append an empty row
    AddRow,
    /// Append an empty column
    AddColumn { name: String },
    /// Delete the row at a zero-based index
    DeleteRow { index: usize },
    /// Set one cell; omitting the value clears it
    SetCell {
        row: usize,
        column: String,
        value: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct ResetArgs {
    #[arg(short, long, value_enum)]
    pub target: ResetTarget,
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

pub fn parse_assignment(value: &str) -> Result<(String, String), String> {
    let (key, val) = value
        .split_once('=')
        .ok_or_else(|| format!("Expected KEY=VALUE, got '{value}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err("Key cannot be empty".to_string());
    }
    Ok((key.to_string(), val.trim().to_string()))
}
