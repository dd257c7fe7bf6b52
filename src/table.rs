//! In-memory tabular buffer shared by every stage of the pipeline.
//!
//! A [`Table`] keeps its column names in display order and stores each row as
//! one [`Value`] per column. Concatenation follows outer-join semantics: the
//! result carries the union of both column sets and cells that one side never
//! had become [`Value::Null`].

use std::borrow::Cow;
use std::fmt::Write as _;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::Value;

/// Provenance column populated by the ingestion layer.
pub const SOURCE_FILE_COLUMN: &str = "source_file";

/// Shape violations found when a table is rebuilt from stored data.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("column '{0}' appears more than once")]
    DuplicateColumn(String),
    #[error("row {row} has {found} cell(s) but the table has {expected} column(s)")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },
}

/// Every row holds exactly one cell per column and column names are unique.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl TryFrom<RawTable> for Table {
    type Error = TableError;

    fn try_from(raw: RawTable) -> Result<Self, Self::Error> {
        let mut seen = HashSet::new();
        if let Some(duplicate) = raw.columns.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(TableError::DuplicateColumn(duplicate.clone()));
        }
        let expected = raw.columns.len();
        if let Some((row, cells)) = raw
            .rows
            .iter()
            .enumerate()
            .find(|(_, cells)| cells.len() != expected)
        {
            return Err(TableError::RaggedRow {
                row,
                found: cells.len(),
                expected,
            });
        }
        Ok(Table {
            columns: raw.columns,
            rows: raw.rows,
        })
    }
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Builds a table from string-ish literals; handy for fixtures.
    pub fn from_rows<C, R, V>(columns: &[C], rows: R) -> Self
    where
        C: AsRef<str>,
        R: IntoIterator<Item = Vec<V>>,
        V: Into<Value>,
    {
        let mut table = Table::new(columns.iter().map(|c| c.as_ref().to_string()).collect());
        for row in rows {
            table.push_row(row.into_iter().map(Into::into).collect());
        }
        table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// A table with no rows is empty even when it declares columns.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Cells of `column` in row order, or `None` when the column is missing.
    pub fn column_values(&self, column: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(column)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Appends a row, padding with nulls or truncating to the column count.
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    /// Outer-join concatenation: `other`'s rows go after ours, new columns are
    /// appended in `other`'s order and back-filled with nulls.
    pub fn concat(&mut self, other: &Table) {
        for column in &other.columns {
            if !self.has_column(column) {
                self.columns.push(column.clone());
                for row in &mut self.rows {
                    row.push(Value::Null);
                }
            }
        }
        let positions = self
            .columns
            .iter()
            .map(|c| other.column_index(c))
            .collect::<Vec<_>>();
        for source in &other.rows {
            let row = positions
                .iter()
                .map(|pos| pos.map(|idx| source[idx].clone()).unwrap_or(Value::Null))
                .collect();
            self.rows.push(row);
        }
    }

    /// Rows whose mask entry is `true`, keeping every column.
    pub fn select_rows(&self, mask: &[bool]) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .zip(mask)
                .filter(|(_, keep)| **keep)
                .map(|(row, _)| row.clone())
                .collect(),
        }
    }

    pub fn retain_rows(&mut self, mask: &[bool]) {
        let mut flags = mask.iter();
        self.rows.retain(|_| flags.next().copied().unwrap_or(true));
    }

    /// Sets `column` to `values`, replacing an existing column of that name in
    /// place or appending a new one.
    pub fn set_column(&mut self, column: &str, values: Vec<Value>) {
        let mut values = values.into_iter();
        match self.column_index(column) {
            Some(idx) => {
                for row in &mut self.rows {
                    row[idx] = values.next().unwrap_or_default();
                }
            }
            None => {
                self.columns.push(column.to_string());
                for row in &mut self.rows {
                    row.push(values.next().unwrap_or_default());
                }
            }
        }
    }

    /// Overwrites one cell; `None` when the row or column does not exist.
    pub fn set_cell(&mut self, row: usize, column: &str, value: Value) -> Option<()> {
        let idx = self.column_index(column)?;
        let cell = self.rows.get_mut(row)?.get_mut(idx)?;
        *cell = value;
        Some(())
    }

    /// Rows where any non-null cell contains `needle`, ignoring case. A blank
    /// needle keeps every row.
    pub fn rows_containing(&self, needle: &str) -> Table {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return self.clone();
        }
        let mask = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .filter(|cell| !cell.is_null())
                    .any(|cell| cell.as_display().to_lowercase().contains(&needle))
            })
            .collect::<Vec<_>>();
        self.select_rows(&mask)
    }

    pub fn remove_row(&mut self, index: usize) -> Option<Vec<Value>> {
        (index < self.rows.len()).then(|| self.rows.remove(index))
    }

    /// Moves `column` to position 0 if present.
    pub fn move_column_first(&mut self, column: &str) {
        let Some(idx) = self.column_index(column) else {
            return;
        };
        if idx == 0 {
            return;
        }
        let name = self.columns.remove(idx);
        self.columns.insert(0, name);
        for row in &mut self.rows {
            let cell = row.remove(idx);
            row.insert(0, cell);
        }
    }

    /// Renders an aligned text grid, truncated to `limit` rows when given.
    pub fn render(&self, limit: Option<usize>) -> String {
        let shown = limit.unwrap_or(self.rows.len()).min(self.rows.len());
        let cells = self.rows[..shown]
            .iter()
            .map(|row| {
                row.iter()
                    .map(|v| sanitize_cell(&v.as_display()).into_owned())
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        let mut widths = self
            .columns
            .iter()
            .map(|h| h.chars().count().max(3))
            .collect::<Vec<_>>();
        for row in &cells {
            for (idx, cell) in row.iter().enumerate() {
                widths[idx] = widths[idx].max(cell.chars().count());
            }
        }

        let mut output = String::new();
        let _ = writeln!(output, "{}", format_line(&self.columns, &widths));
        let rule = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
        let _ = writeln!(output, "{}", format_line(&rule, &widths));
        for row in &cells {
            let _ = writeln!(output, "{}", format_line(row, &widths));
        }
        if shown < self.rows.len() {
            let _ = writeln!(output, "... {} more row(s)", self.rows.len() - shown);
        }
        output
    }
}

fn format_line(values: &[String], widths: &[usize]) -> String {
    let mut line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let padding = width.saturating_sub(value.chars().count());
            format!("{value}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join("  ");
    while line.ends_with(' ') {
        line.pop();
    }
    line
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_is_an_outer_join() {
        let mut left = Table::from_rows(&["a", "b"], vec![vec!["1", "2"]]);
        let right = Table::from_rows(&["b", "c"], vec![vec!["3", "4"]]);
        left.concat(&right);

        assert_eq!(left.columns(), &["a", "b", "c"]);
        assert_eq!(left.rows()[0], vec![Value::text("1"), Value::text("2"), Value::Null]);
        assert_eq!(left.rows()[1], vec![Value::Null, Value::text("3"), Value::text("4")]);
    }

    #[test]
    fn set_column_replaces_in_place() {
        let mut table = Table::from_rows(&["a", "b"], vec![vec!["1", "2"]]);
        table.set_column("a", vec![Value::Number(9.0)]);
        table.set_column("z", vec![Value::Number(1.0)]);
        assert_eq!(table.columns(), &["a", "b", "z"]);
        assert_eq!(table.get(0, "a"), Some(&Value::Number(9.0)));
        assert_eq!(table.get(0, "z"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn move_column_first_reorders_cells() {
        let mut table = Table::from_rows(&["a", SOURCE_FILE_COLUMN], vec![vec!["1", "f.csv"]]);
        table.move_column_first(SOURCE_FILE_COLUMN);
        assert_eq!(table.columns()[0], SOURCE_FILE_COLUMN);
        assert_eq!(table.rows()[0][0], Value::text("f.csv"));
    }

    #[test]
    fn render_aligns_and_truncates() {
        let table = Table::from_rows(
            &["id", "name"],
            vec![vec!["1", "Alice"], vec!["2", "Bob"], vec!["3", "Eve"]],
        );
        let rendered = table.render(Some(2));
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(
            lines,
            vec!["id   name", "---  -----", "1    Alice", "2    Bob", "... 1 more row(s)"]
        );
    }

    #[test]
    fn set_cell_checks_bounds() {
        let mut table = Table::from_rows(&["a", "b"], vec![vec!["1", "2"]]);
        assert_eq!(table.set_cell(0, "b", Value::text("x")), Some(()));
        assert_eq!(table.get(0, "b"), Some(&Value::text("x")));
        assert_eq!(table.set_cell(1, "a", Value::Null), None);
        assert_eq!(table.set_cell(0, "zz", Value::Null), None);
    }

    #[test]
    fn rows_containing_ignores_case_and_nulls() {
        let mut table = Table::from_rows(
            &["plant", "note"],
            vec![vec!["P1", "Bakım"], vec!["P2", "enerji"], vec!["P3", ""]],
        );
        table.set_cell(2, "note", Value::Null);
        table.push_row(vec![Value::Number(42.0)]);

        let hits = table.rows_containing("ENERJ");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits.get(0, "plant"), Some(&Value::text("P2")));
        assert_eq!(table.rows_containing("42").len(), 1);
        assert_eq!(table.rows_containing("bakım").len(), 1);
        assert_eq!(table.rows_containing("  ").len(), 4);
        assert!(table.rows_containing("zzz").is_empty());
    }

    #[test]
    fn deserialize_rejects_ragged_rows_and_duplicate_columns() {
        let ragged = serde_json::from_str::<Table>(
            r#"{"columns":["plant","cc","AMOR"],"rows":[["P1","C1","5"],["P2"]]}"#,
        );
        assert!(ragged.unwrap_err().to_string().contains("row 1 has 1 cell(s)"));

        let duplicate =
            serde_json::from_str::<Table>(r#"{"columns":["a","a"],"rows":[["1","2"]]}"#);
        assert!(duplicate.unwrap_err().to_string().contains("column 'a'"));

        let table = Table::from_rows(&["a", "b"], vec![vec!["1", "2"]]);
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(serde_json::from_str::<Table>(&json).unwrap(), table);
    }

    #[test]
    fn render_replaces_control_characters() {
        let table = Table::from_rows(&["note"], vec![vec!["line1\nline2"]]);
        let rendered = table.render(None);
        assert_eq!(rendered.lines().nth(2), Some("line1 line2"));
    }
}
