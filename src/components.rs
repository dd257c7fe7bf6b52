//! Cost-component resolution and the plant / cost-center compute pipeline.
//!
//! Column lookup here is looser than [`crate::mapper`]: after the exact pass it
//! falls back to the first header whose normalized form *contains* a
//! normalized candidate, instead of scoring edit similarity.

use std::{collections::HashMap, path::Path};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    data::Value,
    formula::{self, FormulaSet},
    normalize::{fold_code, normalize},
    schema::{COST_CENTER_CODE, CanonicalSchema, PLANT_CODE},
    table::{SOURCE_FILE_COLUMN, Table},
};

pub const COMPONENTS: [&str; 5] = ["AMOR", "DIS", "EDIS", "ENER", "GUG"];

pub const PLANT_CANDIDATES: &[&str] = &[
    "is yeri kodu",
    "iş yeri kodu",
    "is yeri",
    "işyeri",
    "plant",
    "site",
    "plant code",
];

pub const COST_CENTER_CANDIDATES: &[&str] = &[
    "masraf yeri kodu",
    "masraf yeri",
    "cost center",
    "cost centre",
    "cc",
    "masraf kodu",
];

pub fn component_candidates(component: &str) -> &'static [&'static str] {
    match component {
        "AMOR" => &["amor", "amortisman", "depreciation"],
        "DIS" => &[
            "dis",
            "di̇s",
            "direkt iscilik",
            "direkt işçilik",
            "direct labor",
            "dl",
        ],
        "EDIS" => &[
            "edis",
            "endirekt iscilik",
            "endirekt işçilik",
            "indirect labor",
            "il",
        ],
        "ENER" => &[
            "ener",
            "enerji",
            "electricity",
            "kwh",
            "energy cost",
            "elektrik",
        ],
        "GUG" => &[
            "gug",
            "güg",
            "genel uretim gider",
            "genel üretim gider",
            "overhead",
            "oh",
        ],
        _ => &[],
    }
}

/// Returns the column whose normalized name equals a normalized candidate
/// (candidate order decides), else the first column containing one. The
/// provenance column never matches.
pub fn find_column_by_candidates<S: AsRef<str>>(
    columns: &[String],
    candidates: &[S],
) -> Option<String> {
    let columns = columns
        .iter()
        .filter(|c| c.as_str() != SOURCE_FILE_COLUMN)
        .collect::<Vec<_>>();
    let mut lookup: HashMap<String, &String> = HashMap::new();
    for column in &columns {
        lookup.entry(normalize(column)).or_insert(*column);
    }
    let normalized = candidates
        .iter()
        .map(|c| normalize(c.as_ref()))
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>();

    if let Some(hit) = normalized.iter().find_map(|c| lookup.get(c)) {
        return Some((*hit).clone());
    }
    columns
        .into_iter()
        .find(|column| {
            let key = normalize(column);
            normalized.iter().any(|c| key.contains(c.as_str()))
        })
        .cloned()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoundColumns {
    pub plant_column: Option<String>,
    pub cost_center_column: Option<String>,
    /// Component name → source column, in [`COMPONENTS`] order.
    pub component_columns: Vec<(String, Option<String>)>,
}

impl FoundColumns {
    pub fn component_column(&self, component: &str) -> Option<&str> {
        self.component_columns
            .iter()
            .find(|(name, _)| name == component)
            .and_then(|(_, column)| column.as_deref())
    }
}

pub fn resolve_columns(table: &Table) -> FoundColumns {
    let columns = table.columns();
    let found = FoundColumns {
        plant_column: find_column_by_candidates(columns, PLANT_CANDIDATES),
        cost_center_column: find_column_by_candidates(columns, COST_CENTER_CANDIDATES),
        component_columns: COMPONENTS
            .iter()
            .map(|component| {
                let column = find_column_by_candidates(columns, component_candidates(component));
                (component.to_string(), column)
            })
            .collect(),
    };
    debug!("Resolved cost columns: {found:?}");
    found
}

/// Row mask for one code constraint: exact case-insensitive equality when any
/// row matches exactly, otherwise case-insensitive containment.
pub fn code_mask(table: &Table, column: &str, code: &str) -> Vec<bool> {
    let Some(values) = table.column_values(column) else {
        return vec![true; table.len()];
    };
    let needle = code.to_lowercase();
    let folded = values
        .iter()
        .map(|v| fold_code(&v.as_display()))
        .collect::<Vec<_>>();
    let exact = folded.iter().map(|v| *v == needle).collect::<Vec<_>>();
    if exact.iter().any(|hit| *hit) {
        exact
    } else {
        folded.iter().map(|v| v.contains(&needle)).collect()
    }
}

/// Keeps rows matching both codes. A blank code, or a code whose column did
/// not resolve, imposes no constraint.
pub fn filter_by_codes(
    table: &Table,
    plant_code: &str,
    cost_center_code: &str,
    found: &FoundColumns,
) -> Table {
    if table.is_empty() {
        return Table::default();
    }
    let mut mask = vec![true; table.len()];
    let constraints = [
        (found.plant_column.as_deref(), plant_code),
        (found.cost_center_column.as_deref(), cost_center_code),
    ];
    for (column, code) in constraints {
        let (Some(column), false) = (column, code.is_empty()) else {
            continue;
        };
        for (keep, hit) in mask.iter_mut().zip(code_mask(table, column, code)) {
            *keep &= hit;
        }
    }
    table.select_rows(&mask)
}

/// Numeric component table for the filtered rows, with provenance and the two
/// key columns copied through under their canonical labels.
pub fn extract_components(filtered: &Table, found: &FoundColumns) -> Table {
    let schema = CanonicalSchema::default();
    let mut out = Table::new(Vec::new());
    for _ in filtered.rows() {
        out.push_row(Vec::new());
    }

    for component in COMPONENTS {
        let values = match found
            .component_column(component)
            .and_then(|column| filtered.column_values(column))
        {
            Some(cells) => cells.iter().map(|v| Value::Number(v.to_float())).collect(),
            None => vec![Value::Number(0.0); filtered.len()],
        };
        out.set_column(component, values);
    }

    let passthrough = [
        (Some(SOURCE_FILE_COLUMN), SOURCE_FILE_COLUMN),
        (found.plant_column.as_deref(), schema.label(PLANT_CODE)),
        (
            found.cost_center_column.as_deref(),
            schema.label(COST_CENTER_CODE),
        ),
    ];
    for (source, label) in passthrough {
        if let Some(cells) = source.and_then(|column| filtered.column_values(column)) {
            out.set_column(label, cells.into_iter().cloned().collect());
        }
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub totals: Vec<(String, f64)>,
}

impl Summary {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.totals
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, total)| *total)
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    pub fn describe(&self) -> String {
        self.totals
            .iter()
            .map(|(name, total)| format!("{name}: {total:.2}"))
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Computation {
    pub rows: Table,
    pub summary: Summary,
}

pub fn summarize(rows: &Table, formulas: &FormulaSet) -> Summary {
    let names = COMPONENTS
        .iter()
        .map(|c| c.to_string())
        .chain(formulas.iter().map(|f| f.name.clone()));
    let mut totals: Vec<(String, f64)> = Vec::new();
    for name in names {
        if totals.iter().any(|(existing, _)| *existing == name) {
            continue;
        }
        if let Some(cells) = rows.column_values(&name) {
            totals.push((name, cells.iter().map(|v| v.to_float()).sum()));
        }
    }
    Summary { totals }
}

pub fn compute_with_formulas(
    table: &Table,
    plant_code: &str,
    cost_center_code: &str,
    formulas: &FormulaSet,
) -> Computation {
    if table.is_empty() {
        return Computation::default();
    }
    let found = resolve_columns(table);
    let filtered = filter_by_codes(table, plant_code, cost_center_code, &found);
    if filtered.is_empty() {
        info!("No rows matched plant '{plant_code}' / cost center '{cost_center_code}'");
        return Computation::default();
    }
    let components = extract_components(&filtered, &found);
    let rows = formula::evaluate(&components, formulas);
    let summary = summarize(&rows, formulas);
    info!(
        "Computed {} row(s) for plant '{plant_code}' / cost center '{cost_center_code}'",
        rows.len()
    );
    Computation { rows, summary }
}

/// End-to-end pipeline; `formula_source` falls back to the built-in formulas
/// when absent or unusable.
pub fn compute_by_plant_cost_center(
    table: &Table,
    plant_code: &str,
    cost_center_code: &str,
    formula_source: Option<&Path>,
) -> Computation {
    let formulas = match formula_source {
        Some(path) => FormulaSet::load_or_default(path),
        None => FormulaSet::default(),
    };
    compute_with_formulas(table, plant_code, cost_center_code, &formulas)
}
