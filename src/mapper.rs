//! Header → canonical field mapping.
//!
//! Matching runs per canonical field, independently: an exact pass over
//! normalized candidates, then a fuzzy pass that accepts the first observed
//! header whose character-level similarity to any candidate reaches
//! [`FUZZY_MATCH_CUTOFF`]. There is no global one-to-one assignment, so in
//! pathological inputs two fields can claim the same header.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};
use similar::TextDiff;

use crate::{
    data::Value,
    normalize::normalize,
    schema::CanonicalSchema,
    table::{SOURCE_FILE_COLUMN, Table},
};

/// Minimum similarity ratio for the fuzzy pass. Scores come from the `similar`
/// crate's diff ratio and may differ slightly from other ratio implementations.
pub const FUZZY_MATCH_CUTOFF: f32 = 0.88;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MatchKind {
    Exact,
    Fuzzy { score: f32 },
    Unmatched,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMatch {
    pub key: String,
    pub header: Option<String>,
    pub kind: MatchKind,
}

/// Canonical field key → observed header, in schema order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub matches: Vec<FieldMatch>,
}

impl ColumnMapping {
    pub fn header_for(&self, key: &str) -> Option<&str> {
        self.matches
            .iter()
            .find(|m| m.key == key)
            .and_then(|m| m.header.as_deref())
    }

    pub fn matched_count(&self) -> usize {
        self.matches.iter().filter(|m| m.header.is_some()).count()
    }
}

pub fn similarity(left: &str, right: &str) -> f32 {
    TextDiff::from_chars(left, right).ratio()
}

#[derive(Debug, Clone, Default)]
pub struct ColumnMapper {
    schema: CanonicalSchema,
}

impl ColumnMapper {
    pub fn new(schema: CanonicalSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &CanonicalSchema {
        &self.schema
    }

    pub fn suggest_mapping(&self, headers: &[String]) -> ColumnMapping {
        // normalized key -> first original header carrying it
        let mut lookup: HashMap<String, &str> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for header in headers {
            let key = normalize(header);
            if !lookup.contains_key(&key) {
                lookup.insert(key.clone(), header.as_str());
                order.push(key);
            }
        }

        let matches = self
            .schema
            .fields()
            .iter()
            .map(|field| {
                let candidates = field
                    .mapping_candidates()
                    .into_iter()
                    .map(normalize)
                    .collect::<Vec<_>>();

                if let Some(header) = candidates.iter().find_map(|c| lookup.get(c)) {
                    debug!("Field '{}' matched '{}' exactly", field.key, header);
                    return FieldMatch {
                        key: field.key.clone(),
                        header: Some(header.to_string()),
                        kind: MatchKind::Exact,
                    };
                }

                for observed in &order {
                    let best = candidates
                        .iter()
                        .map(|c| similarity(observed, c))
                        .fold(0.0_f32, f32::max);
                    if best >= FUZZY_MATCH_CUTOFF {
                        let header = lookup[observed];
                        debug!(
                            "Field '{}' matched '{}' fuzzily ({best:.2})",
                            field.key, header
                        );
                        return FieldMatch {
                            key: field.key.clone(),
                            header: Some(header.to_string()),
                            kind: MatchKind::Fuzzy { score: best },
                        };
                    }
                }

                FieldMatch {
                    key: field.key.clone(),
                    header: None,
                    kind: MatchKind::Unmatched,
                }
            })
            .collect();

        ColumnMapping { matches }
    }

    /// Materializes the canonical view: one column per canonical label in
    /// schema order, plus the provenance column when the input has one.
    pub fn apply_mapping(&self, table: &Table, mapping: &ColumnMapping) -> Table {
        let mut columns = self
            .schema
            .labels()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let mut sources = self
            .schema
            .fields()
            .iter()
            .map(|field| {
                mapping
                    .header_for(&field.key)
                    .and_then(|header| table.column_index(header))
            })
            .collect::<Vec<_>>();
        if let Some(idx) = table.column_index(SOURCE_FILE_COLUMN) {
            columns.push(SOURCE_FILE_COLUMN.to_string());
            sources.push(Some(idx));
        }

        let mut out = Table::new(columns);
        for row in table.rows() {
            out.push_row(
                sources
                    .iter()
                    .map(|src| src.map(|idx| row[idx].clone()).unwrap_or(Value::Null))
                    .collect(),
            );
        }
        out
    }
}
