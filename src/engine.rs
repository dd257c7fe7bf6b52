//! The two-buffer data store.
//!
//! The *top* buffer is the system of record, the *bottom* buffer holds staged
//! data awaiting import. Every operation either always succeeds or validates
//! its input before touching state, so a failed call leaves the engine as it
//! was.

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
};

use itertools::Itertools;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    components::{code_mask, find_column_by_candidates},
    data::Value,
    mapper::{ColumnMapper, ColumnMapping},
    normalize::fold_code,
    schema::{COST_CENTER_CODE, CanonicalSchema, PLANT_CODE},
    store::{Artifact, SaveMetadata, StateStore, StoreError},
    table::{SOURCE_FILE_COLUMN, Table},
};

/// Share (in percent) the most frequent value needs before autofill accepts it
/// from a column with several distinct values.
pub const AUTOFILL_MIN_SHARE_PERCENT: usize = 90;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub top_table: Option<Table>,
    pub staged_table: Option<Table>,
    pub processed_table: Option<Table>,
    pub loaded_files_top: Vec<String>,
    pub loaded_files_bottom: Vec<String>,
    pub manual_values: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Buffer {
    Top,
    Bottom,
    Processed,
}

impl fmt::Display for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Buffer::Top => "top",
            Buffer::Bottom => "bottom",
            Buffer::Processed => "processed",
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("no table is loaded in the {0} buffer")]
    NoTable(Buffer),
    #[error("the {0} buffer cannot be edited")]
    ReadOnly(Buffer),
    #[error("column name must not be blank")]
    BlankColumnName,
    #[error("column '{0}' already exists")]
    DuplicateColumn(String),
    #[error("row {index} is out of range for a table with {len} row(s)")]
    RowOutOfRange { index: usize, len: usize },
    #[error("column '{0}' does not exist")]
    UnknownColumn(String),
}

pub struct Engine {
    state: EngineState,
    mapper: ColumnMapper,
    store: Box<dyn StateStore>,
}

impl Engine {
    pub fn new(store: Box<dyn StateStore>) -> Self {
        Self::with_schema(CanonicalSchema::default(), store)
    }

    pub fn with_schema(schema: CanonicalSchema, store: Box<dyn StateStore>) -> Self {
        Self {
            state: EngineState::default(),
            mapper: ColumnMapper::new(schema),
            store,
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn schema(&self) -> &CanonicalSchema {
        self.mapper.schema()
    }

    pub fn table(&self, buffer: Buffer) -> Option<&Table> {
        match buffer {
            Buffer::Top => self.state.top_table.as_ref(),
            Buffer::Bottom => self.state.staged_table.as_ref(),
            Buffer::Processed => self.state.processed_table.as_ref(),
        }
    }

    pub fn manual_values(&self) -> &BTreeMap<String, String> {
        &self.state.manual_values
    }

    pub fn manual_value(&self, key: &str) -> Option<&str> {
        self.state
            .manual_values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Sets a manual value; a blank value clears the key.
    pub fn set_manual_value(&mut self, key: &str, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            self.state.manual_values.remove(key);
        } else {
            self.state
                .manual_values
                .insert(key.to_string(), value.to_string());
        }
    }

    pub fn append_top(&mut self, table: &Table, paths: &[String]) {
        append_into(
            &mut self.state.top_table,
            &mut self.state.loaded_files_top,
            table,
            paths,
        );
    }

    pub fn append_bottom(&mut self, table: &Table, paths: &[String]) {
        append_into(
            &mut self.state.staged_table,
            &mut self.state.loaded_files_bottom,
            table,
            paths,
        );
    }

    /// Fills manual values from columns whose values (nearly) agree. Returns
    /// the keys that were set, in `keys` order.
    pub fn autofill_manual_from_table(
        &mut self,
        table: &Table,
        keys: &[&str],
        override_existing: bool,
    ) -> Vec<String> {
        let mut filled = Vec::new();
        for key in keys {
            if !override_existing && self.manual_value(key).is_some() {
                continue;
            }
            let candidates = self.lookup_candidates(key);
            let Some(column) = find_column_by_candidates(table.columns(), &candidates) else {
                continue;
            };
            let values = table
                .column_values(&column)
                .unwrap_or_default()
                .into_iter()
                .filter_map(Value::present_text)
                .collect::<Vec<_>>();
            let Some(value) = majority_value(&values) else {
                debug!("No dominant value for '{key}' in column '{column}'");
                continue;
            };
            info!("Autofilled '{key}' = '{value}' from column '{column}'");
            self.state
                .manual_values
                .insert(key.to_string(), value.to_string());
            filled.push(key.to_string());
        }
        filled
    }

    /// Merges the staged buffer into the system buffer and returns
    /// `(removed, added)`. With `replace_on_keys`, system rows whose
    /// (plant, cost center) pair occurs in the staged data are dropped first.
    /// The staged buffer is left as it is.
    pub fn import_staged_into_system(&mut self, replace_on_keys: bool) -> (usize, usize) {
        let Some(staged) = self.state.staged_table.clone().filter(|t| !t.is_empty()) else {
            return (0, 0);
        };
        let added = staged.len();
        let Some(mut system) = self.state.top_table.take().filter(|t| !t.is_empty()) else {
            info!("System buffer empty; imported {added} staged row(s) as-is");
            self.state.top_table = Some(staged);
            return (0, added);
        };

        let mut removed = 0;
        if replace_on_keys {
            match (self.key_pairs(&staged), self.key_pairs(&system)) {
                (Some(staged_pairs), Some(system_pairs)) => {
                    let replace = staged_pairs.into_iter().collect::<HashSet<_>>();
                    let keep = system_pairs
                        .iter()
                        .map(|pair| !replace.contains(pair))
                        .collect::<Vec<_>>();
                    removed = keep.iter().filter(|k| !**k).count();
                    system.retain_rows(&keep);
                }
                _ => debug!("Key columns unresolved; importing without replacement"),
            }
        }
        system.concat(&staged);
        self.state.top_table = Some(system);
        info!("Import removed {removed} row(s) and added {added} row(s)");
        (removed, added)
    }

    /// Suggests a mapping for the top buffer and caches the canonical view.
    pub fn auto_apply_top(&mut self) -> Option<ColumnMapping> {
        let top = self.state.top_table.as_ref().filter(|t| !t.is_empty())?;
        let mapping = self.mapper.suggest_mapping(top.columns());
        let processed = self.mapper.apply_mapping(top, &mapping);
        info!(
            "Mapped {} of {} canonical field(s)",
            mapping.matched_count(),
            mapping.matches.len()
        );
        self.state.processed_table = Some(processed);
        Some(mapping)
    }

    /// Rows of `buffer` matching the given codes, with the provenance column
    /// moved to the front. Blank codes do not constrain.
    pub fn filter_buffer_by_codes(
        &self,
        buffer: Buffer,
        plant_code: &str,
        cost_center_code: &str,
    ) -> Table {
        let Some(table) = self.table(buffer).filter(|t| !t.is_empty()) else {
            return Table::default();
        };
        let mut mask = vec![true; table.len()];
        for (key, code) in [(PLANT_CODE, plant_code), (COST_CENTER_CODE, cost_center_code)] {
            let code = code.trim();
            if code.is_empty() {
                continue;
            }
            let candidates = self.lookup_candidates(key);
            let Some(column) = find_column_by_candidates(table.columns(), &candidates) else {
                continue;
            };
            for (keep, hit) in mask.iter_mut().zip(code_mask(table, &column, code)) {
                *keep &= hit;
            }
        }
        let mut filtered = table.select_rows(&mask);
        if filtered.is_empty() {
            return Table::default();
        }
        filtered.move_column_first(SOURCE_FILE_COLUMN);
        filtered
    }

    pub fn add_row(&mut self, buffer: Buffer) -> Result<usize, EngineError> {
        let table = self.editable(buffer)?;
        table.push_row(Vec::new());
        Ok(table.len() - 1)
    }

    pub fn add_column(&mut self, buffer: Buffer, name: &str) -> Result<(), EngineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::BlankColumnName);
        }
        let table = self.editable(buffer)?;
        if table.has_column(name) {
            return Err(EngineError::DuplicateColumn(name.to_string()));
        }
        let len = table.len();
        table.set_column(name, vec![Value::Null; len]);
        Ok(())
    }

    pub fn delete_row(&mut self, buffer: Buffer, index: usize) -> Result<(), EngineError> {
        let table = self.editable(buffer)?;
        let len = table.len();
        table
            .remove_row(index)
            .map(|_| ())
            .ok_or(EngineError::RowOutOfRange { index, len })
    }

    /// Stores the trimmed `value` in one cell; a blank value becomes `Null`.
    pub fn set_cell(
        &mut self,
        buffer: Buffer,
        row: usize,
        column: &str,
        value: &str,
    ) -> Result<(), EngineError> {
        let table = self.editable(buffer)?;
        if !table.has_column(column) {
            return Err(EngineError::UnknownColumn(column.to_string()));
        }
        let len = table.len();
        let value = match value.trim() {
            "" => Value::Null,
            text => Value::text(text),
        };
        table
            .set_cell(row, column, value)
            .ok_or(EngineError::RowOutOfRange { index: row, len })
    }

    pub fn reset_top(&mut self) {
        self.state.top_table = None;
        self.state.processed_table = None;
        self.state.loaded_files_top.clear();
        self.discard(&[Artifact::System, Artifact::Processed]);
    }

    pub fn reset_bottom(&mut self) {
        self.state.staged_table = None;
        self.state.loaded_files_bottom.clear();
        self.discard(&[Artifact::Staged]);
    }

    pub fn reset_all(&mut self) {
        self.state = EngineState::default();
        self.discard(&Artifact::ALL);
    }

    pub fn snapshot(&self) -> EngineState {
        self.state.clone()
    }

    pub fn restore(&mut self, state: EngineState) {
        self.state = state;
    }

    /// Replaces the in-memory state with the stored one; on failure the engine
    /// starts empty.
    pub fn load_state(&mut self) {
        self.state = match self.store.load() {
            Ok(state) => state,
            Err(err) => {
                warn!("Could not load saved state, starting empty: {err}");
                EngineState::default()
            }
        };
    }

    pub fn save_state(&mut self, metadata: &SaveMetadata) -> Result<(), StoreError> {
        self.store.save(&self.state, metadata)
    }

    fn discard(&mut self, artifacts: &[Artifact]) {
        if let Err(err) = self.store.discard(artifacts) {
            warn!("Failed to discard stored artifacts {artifacts:?}: {err}");
        }
    }

    fn editable(&mut self, buffer: Buffer) -> Result<&mut Table, EngineError> {
        let slot = match buffer {
            Buffer::Top => &mut self.state.top_table,
            Buffer::Bottom => &mut self.state.staged_table,
            Buffer::Processed => return Err(EngineError::ReadOnly(buffer)),
        };
        slot.as_mut().ok_or(EngineError::NoTable(buffer))
    }

    fn lookup_candidates(&self, key: &str) -> Vec<String> {
        match self.schema().field(key) {
            Some(field) => field
                .lookup_candidates()
                .into_iter()
                .map(str::to_string)
                .collect(),
            None => vec![key.to_string()],
        }
    }

    /// Folded (plant, cost center) pair per row, or `None` when either column
    /// does not resolve.
    fn key_pairs(&self, table: &Table) -> Option<Vec<(String, String)>> {
        let plant = find_column_by_candidates(table.columns(), &self.lookup_candidates(PLANT_CODE))?;
        let cost_center =
            find_column_by_candidates(table.columns(), &self.lookup_candidates(COST_CENTER_CODE))?;
        let plants = table.column_values(&plant)?;
        let cost_centers = table.column_values(&cost_center)?;
        Some(
            plants
                .iter()
                .zip(cost_centers)
                .map(|(p, c)| (fold_code(&p.as_display()), fold_code(&c.as_display())))
                .collect(),
        )
    }
}

fn append_into(
    slot: &mut Option<Table>,
    files: &mut Vec<String>,
    table: &Table,
    paths: &[String],
) {
    if table.is_empty() {
        return;
    }
    match slot {
        Some(existing) => existing.concat(table),
        None => *slot = Some(table.clone()),
    }
    for path in paths {
        if !files.contains(path) {
            files.push(path.clone());
        }
    }
}

/// The single distinct value, or the most frequent one when its share reaches
/// [`AUTOFILL_MIN_SHARE_PERCENT`].
fn majority_value(values: &[String]) -> Option<&str> {
    let counts = values.iter().counts();
    let (&value, &count) = counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))?;
    let accepted =
        counts.len() == 1 || count * 100 >= values.len() * AUTOFILL_MIN_SHARE_PERCENT;
    accepted.then_some(value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AUTOFILL_KEYS, MACHINE_CODE};
    use crate::store::MemoryStore;

    fn engine() -> Engine {
        Engine::new(Box::new(MemoryStore::new()))
    }

    fn paths(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn plant_column(share: usize) -> Table {
        let rows = (0..10)
            .map(|i| vec![if i < share { "P1" } else { "P2" }])
            .collect::<Vec<_>>();
        Table::from_rows(&["Plant"], rows)
    }

    #[test]
    fn append_outer_joins_and_dedups_paths() {
        let mut engine = engine();
        engine.append_top(&Table::from_rows(&["a"], vec![vec!["1"]]), &paths(&["x.csv"]));
        engine.append_top(
            &Table::from_rows(&["b"], vec![vec!["2"]]),
            &paths(&["x.csv", "y.csv"]),
        );
        engine.append_top(&Table::from_rows(&["c"], Vec::<Vec<&str>>::new()), &paths(&["z.csv"]));

        let top = engine.table(Buffer::Top).unwrap();
        assert_eq!(top.columns(), &["a", "b"]);
        assert_eq!(top.get(0, "b"), Some(&Value::Null));
        assert_eq!(engine.state().loaded_files_top, paths(&["x.csv", "y.csv"]));
    }

    #[test]
    fn autofill_takes_unanimous_values_and_respects_existing() {
        let mut engine = engine();
        engine.set_manual_value(MACHINE_CODE, "M-9");
        let table = Table::from_rows(
            &["İş Yeri", "Masraf Yeri", "Makine Kodu"],
            vec![vec!["P1", "C1", "M1"], vec![" P1 ", "nan", "M1"]],
        );
        let filled = engine.autofill_manual_from_table(&table, AUTOFILL_KEYS, false);
        assert_eq!(filled, paths(&[PLANT_CODE, COST_CENTER_CODE]));
        assert_eq!(engine.manual_value(PLANT_CODE), Some("P1"));
        assert_eq!(engine.manual_value(COST_CENTER_CODE), Some("C1"));
        assert_eq!(engine.manual_value(MACHINE_CODE), Some("M-9"));

        let filled = engine.autofill_manual_from_table(&table, AUTOFILL_KEYS, true);
        assert_eq!(filled.len(), 3);
        assert_eq!(engine.manual_value(MACHINE_CODE), Some("M1"));
    }

    #[test]
    fn autofill_requires_ninety_percent_share() {
        let mut engine = engine();
        assert!(
            engine
                .autofill_manual_from_table(&plant_column(8), &[PLANT_CODE], false)
                .is_empty()
        );
        assert_eq!(engine.manual_value(PLANT_CODE), None);

        let filled = engine.autofill_manual_from_table(&plant_column(9), &[PLANT_CODE], false);
        assert_eq!(filled, paths(&[PLANT_CODE]));
        assert_eq!(engine.manual_value(PLANT_CODE), Some("P1"));
    }

    #[test]
    fn autofill_drops_only_exact_missing_spellings() {
        let mut engine = engine();
        let table = Table::from_rows(
            &["Plant", "Cost Center"],
            vec![vec!["NULL", "<NA>"], vec!["NULL", "None"], vec!["None", "nan"]],
        );
        let filled = engine.autofill_manual_from_table(&table, AUTOFILL_KEYS, false);
        assert_eq!(filled, paths(&[PLANT_CODE]));
        assert_eq!(engine.manual_value(PLANT_CODE), Some("NULL"));
        assert_eq!(engine.manual_value(COST_CENTER_CODE), None);
    }

    fn keyed(rows: Vec<Vec<&str>>) -> Table {
        Table::from_rows(&["Plant", "Cost Center", "AMOR"], rows)
    }

    #[test]
    fn import_into_empty_system_copies_staged() {
        let mut engine = engine();
        assert_eq!(engine.import_staged_into_system(true), (0, 0));
        engine.append_bottom(&keyed(vec![vec!["P1", "C1", "5"]]), &paths(&["s.csv"]));
        assert_eq!(engine.import_staged_into_system(true), (0, 1));
        assert_eq!(engine.table(Buffer::Top), engine.table(Buffer::Bottom));
    }

    #[test]
    fn import_replaces_matching_keys_and_is_idempotent() {
        let mut engine = engine();
        engine.append_top(
            &keyed(vec![
                vec!["P1", "C1", "1"],
                vec!["p1 ", "c1", "2"],
                vec!["P2", "C2", "3"],
            ]),
            &[],
        );
        engine.append_bottom(&keyed(vec![vec!["P1", "C1", "10"]]), &[]);

        assert_eq!(engine.import_staged_into_system(true), (2, 1));
        let after_first = engine.table(Buffer::Top).cloned().unwrap();
        assert_eq!(after_first.len(), 2);
        assert_eq!(after_first.get(1, "AMOR"), Some(&Value::text("10")));

        assert_eq!(engine.import_staged_into_system(true), (1, 1));
        assert_eq!(engine.table(Buffer::Top), Some(&after_first));
        assert_eq!(engine.table(Buffer::Bottom).map(Table::len), Some(1));
    }

    #[test]
    fn import_without_replace_appends_everything() {
        let mut engine = engine();
        engine.append_top(&keyed(vec![vec!["P1", "C1", "1"]]), &[]);
        engine.append_bottom(&keyed(vec![vec!["P1", "C1", "2"]]), &[]);
        assert_eq!(engine.import_staged_into_system(false), (0, 1));
        assert_eq!(engine.table(Buffer::Top).map(Table::len), Some(2));
    }

    #[test]
    fn auto_apply_top_caches_processed_view() {
        let mut engine = engine();
        assert!(engine.auto_apply_top().is_none());
        engine.append_top(&keyed(vec![vec!["P1", "C1", "1"]]), &[]);
        let mapping = engine.auto_apply_top().unwrap();
        assert_eq!(mapping.header_for(PLANT_CODE), Some("Plant"));
        let processed = engine.table(Buffer::Processed).unwrap();
        assert_eq!(processed.get(0, "Masraf Yeri Kodu"), Some(&Value::text("C1")));
    }

    #[test]
    fn filter_buffer_moves_provenance_first() {
        let mut engine = engine();
        let table = Table::from_rows(
            &["Plant", "Cost Center", SOURCE_FILE_COLUMN],
            vec![vec!["P1-EXT", "C1", "a.csv"], vec!["P2", "C1", "b.csv"]],
        );
        engine.append_top(&table, &[]);

        let filtered = engine.filter_buffer_by_codes(Buffer::Top, "P1", "C1");
        assert_eq!(filtered.columns()[0], SOURCE_FILE_COLUMN);
        assert_eq!(filtered.len(), 1);
        assert!(engine.filter_buffer_by_codes(Buffer::Top, "P9", "").is_empty());
        assert!(engine.filter_buffer_by_codes(Buffer::Bottom, "P1", "").is_empty());
    }

    #[test]
    fn edits_validate_before_mutating() {
        let mut engine = engine();
        assert_eq!(engine.add_row(Buffer::Top), Err(EngineError::NoTable(Buffer::Top)));
        engine.append_top(&Table::from_rows(&["a"], vec![vec!["1"]]), &[]);

        assert_eq!(engine.add_row(Buffer::Top), Ok(1));
        assert_eq!(engine.add_column(Buffer::Top, "b"), Ok(()));
        assert_eq!(
            engine.add_column(Buffer::Top, "a"),
            Err(EngineError::DuplicateColumn("a".into()))
        );
        assert_eq!(engine.add_column(Buffer::Top, "  "), Err(EngineError::BlankColumnName));
        assert_eq!(
            engine.delete_row(Buffer::Top, 5),
            Err(EngineError::RowOutOfRange { index: 5, len: 2 })
        );
        assert_eq!(engine.delete_row(Buffer::Top, 0), Ok(()));
        assert_eq!(
            engine.add_row(Buffer::Processed),
            Err(EngineError::ReadOnly(Buffer::Processed))
        );

        let top = engine.table(Buffer::Top).unwrap();
        assert_eq!(top.columns(), &["a", "b"]);
        assert_eq!(top.rows(), &[vec![Value::Null, Value::Null]]);
    }

    #[test]
    fn set_cell_trims_and_blanks_to_null() {
        let mut engine = engine();
        assert_eq!(
            engine.set_cell(Buffer::Bottom, 0, "a", "x"),
            Err(EngineError::NoTable(Buffer::Bottom))
        );
        engine.append_top(&Table::from_rows(&["a", "b"], vec![vec!["1", "2"]]), &[]);

        assert_eq!(engine.set_cell(Buffer::Top, 0, "b", "  P7 "), Ok(()));
        assert_eq!(engine.set_cell(Buffer::Top, 0, "a", "   "), Ok(()));
        assert_eq!(
            engine.set_cell(Buffer::Top, 3, "a", "x"),
            Err(EngineError::RowOutOfRange { index: 3, len: 1 })
        );
        assert_eq!(
            engine.set_cell(Buffer::Top, 0, "zz", "x"),
            Err(EngineError::UnknownColumn("zz".into()))
        );
        assert_eq!(
            engine.set_cell(Buffer::Processed, 0, "a", "x"),
            Err(EngineError::ReadOnly(Buffer::Processed))
        );

        let top = engine.table(Buffer::Top).unwrap();
        assert_eq!(top.rows(), &[vec![Value::Null, Value::text("P7")]]);
    }

    #[test]
    fn load_state_reads_from_store() {
        let mut seeded = EngineState {
            top_table: Some(Table::from_rows(&["a"], vec![vec!["1"]])),
            ..EngineState::default()
        };
        seeded.manual_values.insert(PLANT_CODE.into(), "P1".into());
        let mut engine = Engine::new(Box::new(MemoryStore::with_state(seeded.clone())));
        assert_eq!(engine.snapshot(), EngineState::default());

        engine.load_state();
        assert_eq!(engine.snapshot(), seeded);
        assert_eq!(engine.manual_value(PLANT_CODE), Some("P1"));
    }

    #[test]
    fn resets_clear_buffers_and_store() {
        let mut engine = engine();
        engine.append_top(&keyed(vec![vec!["P1", "C1", "1"]]), &paths(&["t.csv"]));
        engine.append_bottom(&keyed(vec![vec!["P1", "C1", "1"]]), &paths(&["b.csv"]));
        engine.auto_apply_top();
        engine.set_manual_value(PLANT_CODE, "P1");
        engine.save_state(&SaveMetadata::now()).unwrap();

        engine.reset_top();
        assert!(engine.table(Buffer::Top).is_none());
        assert!(engine.table(Buffer::Processed).is_none());
        assert!(engine.state().loaded_files_top.is_empty());
        assert!(engine.table(Buffer::Bottom).is_some());

        engine.load_state();
        assert!(engine.table(Buffer::Top).is_none());
        assert!(engine.table(Buffer::Bottom).is_some());

        engine.reset_all();
        assert_eq!(engine.snapshot(), EngineState::default());
        engine.load_state();
        assert_eq!(engine.snapshot(), EngineState::default());
    }

    #[test]
    fn snapshot_and_restore_round_trip() {
        let mut engine = engine();
        engine.append_top(&keyed(vec![vec!["P1", "C1", "1"]]), &[]);
        let before = engine.snapshot();
        engine.add_row(Buffer::Top).unwrap();
        assert_ne!(engine.snapshot(), before);
        engine.restore(before.clone());
        assert_eq!(engine.snapshot(), before);
    }

    struct BrokenStore;

    impl StateStore for BrokenStore {
        fn load(&self) -> Result<EngineState, StoreError> {
            Err(StoreError::Unavailable("offline".into()))
        }

        fn save(&mut self, _: &EngineState, _: &SaveMetadata) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("offline".into()))
        }

        fn discard(&mut self, _: &[Artifact]) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("offline".into()))
        }
    }

    #[test]
    fn store_failures_are_contained() {
        let mut engine = Engine::new(Box::new(BrokenStore));
        engine.append_top(&Table::from_rows(&["a"], vec![vec!["1"]]), &[]);
        let before = engine.snapshot();
        assert!(engine.save_state(&SaveMetadata::now()).is_err());
        assert_eq!(engine.snapshot(), before);

        engine.reset_bottom();
        assert!(engine.table(Buffer::Top).is_some());

        engine.load_state();
        assert_eq!(engine.snapshot(), EngineState::default());
    }
}
