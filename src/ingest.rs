//! Reading delimited files into [`Table`]s and exporting them back out.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::{
    data::Value,
    io_utils,
    table::{SOURCE_FILE_COLUMN, Table},
};

#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub delimiter: Option<u8>,
    pub encoding: Option<String>,
}

/// Reads one delimited file. Empty cells become [`Value::Null`] and short rows
/// are padded.
pub fn read_file(path: &Path, options: &ReadOptions) -> Result<Table> {
    let encoding = io_utils::resolve_encoding(options.encoding.as_deref())?;
    let text = io_utils::read_text(path, encoding)?;
    let delimiter = io_utils::resolve_input_delimiter(path, options.delimiter, &text);
    debug!(
        "Reading {path:?} with delimiter '{}' and encoding {}",
        io_utils::printable_delimiter(delimiter),
        encoding.name()
    );

    let mut reader = io_utils::open_csv_reader(text.as_bytes(), delimiter);
    let headers = reader
        .headers()
        .with_context(|| format!("Reading header row from {path:?}"))?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    if headers.is_empty() {
        return Ok(Table::default());
    }

    let mut table = Table::new(dedupe_headers(headers));
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Reading row {} of {path:?}", idx + 2))?;
        table.push_row(
            record
                .iter()
                .map(|cell| {
                    if cell.is_empty() {
                        Value::Null
                    } else {
                        Value::text(cell)
                    }
                })
                .collect(),
        );
    }
    Ok(table)
}

/// Reads every path, tags rows with their file name and outer-joins the
/// results. Unreadable or empty files are skipped.
pub fn read_files(paths: &[PathBuf], options: &ReadOptions) -> Table {
    let mut combined = Table::default();
    for path in paths {
        let mut table = match read_file(path, options) {
            Ok(table) => table,
            Err(err) => {
                warn!("Skipping {path:?}: {err:#}");
                continue;
            }
        };
        if table.is_empty() {
            warn!("Skipping {path:?}: no data rows");
            continue;
        }
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        table.set_column(
            SOURCE_FILE_COLUMN,
            vec![Value::text(file_name); table.len()],
        );
        info!("Read {} row(s) from {path:?}", table.len());
        combined.concat(&table);
    }
    combined
}

/// Makes header names unique: blanks become `Unnamed: N` and repeats get
/// `.1`, `.2`, ... suffixes.
pub fn dedupe_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    headers
        .into_iter()
        .enumerate()
        .map(|(idx, header)| {
            let base = if header.trim().is_empty() {
                format!("Unnamed: {idx}")
            } else {
                header
            };
            let mut name = base.clone();
            let mut suffix = 1;
            while seen.contains(&name) {
                name = format!("{base}.{suffix}");
                suffix += 1;
            }
            seen.insert(name.clone());
            name
        })
        .collect()
}

/// Writes `table` as delimited text; `None` or `-` goes to stdout.
pub fn write_csv(table: &Table, path: Option<&Path>, delimiter: Option<u8>) -> Result<()> {
    let delimiter = io_utils::resolve_output_delimiter(path, delimiter);
    let mut writer = io_utils::open_csv_writer(path, delimiter)?;
    writer
        .write_record(table.columns())
        .context("Writing header row")?;
    for row in table.rows() {
        writer
            .write_record(row.iter().map(Value::as_display))
            .context("Writing data row")?;
    }
    writer.flush().context("Flushing output")?;
    Ok(())
}
