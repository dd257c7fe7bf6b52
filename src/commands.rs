//! Command handlers behind the `cost-reconcile` binary.
//!
//! Each invocation loads the saved state, pushes an undo snapshot before any
//! mutation, and saves state plus history afterwards.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use log::info;

use crate::{
    cli::{
        ComputeArgs, EditAction, EditArgs, ExportArgs, ImportArgs, LoadArgs, ManualArgs,
        ResetArgs, ResetTarget, ShowArgs,
    },
    components,
    engine::{Buffer, Engine},
    history::History,
    ingest::{self, ReadOptions},
    mapper::{ColumnMapping, MatchKind},
    schema::{AUTOFILL_KEYS, COST_CENTER_CODE, PLANT_CODE},
    store::{JsonDirStore, SaveMetadata},
};

pub const HISTORY_FILE: &str = "history.json";
pub const FORMULA_FILE: &str = "formulas.csv";

pub struct Workspace {
    state_dir: PathBuf,
    engine: Engine,
    history: History,
}

impl Workspace {
    pub fn open(state_dir: &Path) -> Self {
        let mut engine = Engine::new(Box::new(JsonDirStore::new(state_dir)));
        engine.load_state();
        let history = History::load_or_default(&state_dir.join(HISTORY_FILE));
        Self {
            state_dir: state_dir.to_path_buf(),
            engine,
            history,
        }
    }

    fn checkpoint(&mut self) {
        self.history.push(self.engine.snapshot());
    }

    fn commit(&mut self, command: &str) -> Result<()> {
        fs::create_dir_all(&self.state_dir)
            .with_context(|| format!("Creating state directory {:?}", self.state_dir))?;
        self.engine
            .save_state(&SaveMetadata::now().with_extra("command", command))
            .with_context(|| format!("Saving state to {:?}", self.state_dir))?;
        self.history.save(&self.state_dir.join(HISTORY_FILE))
    }

    pub fn load(&mut self, args: &LoadArgs) -> Result<()> {
        let options = ReadOptions {
            delimiter: args.delimiter,
            encoding: args.input_encoding.clone(),
        };
        let table = ingest::read_files(&args.files, &options);
        if table.is_empty() {
            bail!("No rows could be read from the given file(s)");
        }
        let paths = args
            .files
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>();
        let buffer = Buffer::from(args.target);

        self.checkpoint();
        match buffer {
            Buffer::Bottom => self.engine.append_bottom(&table, &paths),
            _ => self.engine.append_top(&table, &paths),
        }
        let filled = self
            .engine
            .autofill_manual_from_table(&table, AUTOFILL_KEYS, false);
        info!(
            "Loaded {} row(s) into the {buffer} buffer from {} file(s)",
            table.len(),
            paths.len()
        );
        println!("Loaded {} row(s) into {buffer}", table.len());
        for key in filled {
            if let Some(value) = self.engine.manual_value(&key) {
                println!("{key} = {value}");
            }
        }
        self.commit("load")
    }

    pub fn import(&mut self, args: &ImportArgs) -> Result<()> {
        self.checkpoint();
        let (removed, added) = self.engine.import_staged_into_system(!args.no_replace);
        println!("Removed {removed} row(s), added {added} row(s)");
        self.commit("import")
    }

    pub fn map(&mut self) -> Result<()> {
        self.checkpoint();
        let Some(mapping) = self.engine.auto_apply_top() else {
            bail!("The top buffer is empty; load data first");
        };
        print!("{}", describe_mapping(&self.engine, &mapping));
        self.commit("map")
    }

    pub fn compute(&self, args: &ComputeArgs) -> Result<()> {
        let plant = self.code(args.plant.as_deref(), PLANT_CODE)?;
        let cost_center = self.code(args.cost_center.as_deref(), COST_CENTER_CODE)?;
        let Some(table) = self.engine.table(Buffer::Top) else {
            bail!("The top buffer is empty; load data first");
        };
        let default_source = self.state_dir.join(FORMULA_FILE);
        let formula_source = args
            .formulas
            .as_deref()
            .or_else(|| default_source.exists().then_some(default_source.as_path()));

        let result =
            components::compute_by_plant_cost_center(table, &plant, &cost_center, formula_source);
        if result.rows.is_empty() {
            println!("No rows matched plant '{plant}' and cost center '{cost_center}'");
            return Ok(());
        }
        print!("{}", result.rows.render(None));
        println!("{}", result.summary.describe());
        if let Some(output) = &args.output {
            ingest::write_csv(&result.rows, Some(output), None)
                .with_context(|| format!("Writing computed rows to {output:?}"))?;
            info!("Computed rows written to {output:?}");
        }
        Ok(())
    }

    pub fn show(&self, args: &ShowArgs) -> Result<()> {
        let buffer = Buffer::from(args.target);
        let plant = args.plant.as_deref().unwrap_or_default();
        let cost_center = args.cost_center.as_deref().unwrap_or_default();
        let mut table = if plant.is_empty() && cost_center.is_empty() {
            self.engine.table(buffer).cloned().unwrap_or_default()
        } else {
            self.engine
                .filter_buffer_by_codes(buffer, plant, cost_center)
        };
        if let Some(needle) = args.search.as_deref() {
            table = table.rows_containing(needle);
        }
        if table.is_empty() {
            println!("The {buffer} buffer has no matching rows");
        } else {
            print!("{}", table.render(args.limit));
        }
        Ok(())
    }

    pub fn export(&self, args: &ExportArgs) -> Result<()> {
        let buffer = Buffer::from(args.target);
        let Some(table) = self.engine.table(buffer).filter(|t| !t.is_empty()) else {
            bail!("The {buffer} buffer is empty");
        };
        ingest::write_csv(table, Some(&args.output), args.delimiter)
            .with_context(|| format!("Exporting {buffer} buffer to {:?}", args.output))?;
        info!("Exported {} row(s) to {:?}", table.len(), args.output);
        Ok(())
    }

    pub fn manual(&mut self, args: &ManualArgs) -> Result<()> {
        if !args.values.is_empty() {
            self.checkpoint();
            for (key, value) in &args.values {
                self.engine.set_manual_value(key, value);
            }
            self.commit("manual")?;
        }
        for (key, value) in self.engine.manual_values() {
            println!("{key} = {value}");
        }
        Ok(())
    }

    pub fn edit(&mut self, args: &EditArgs) -> Result<()> {
        let buffer = Buffer::from(args.target);
        self.checkpoint();
        match &args.action {
            EditAction::AddRow => {
                let index = self.engine.add_row(buffer)?;
                println!("Added row {index} to {buffer}");
            }
            EditAction::AddColumn { name } => {
                self.engine.add_column(buffer, name)?;
                println!("Added column '{}' to {buffer}", name.trim());
            }
            EditAction::DeleteRow { index } => {
                self.engine.delete_row(buffer, *index)?;
                println!("Deleted row {index} from {buffer}");
            }
            EditAction::SetCell { row, column, value } => {
                self.engine
                    .set_cell(buffer, *row, column, value.as_deref().unwrap_or_default())?;
                println!("Updated {buffer} row {row}, column '{column}'");
            }
        }
        self.commit("edit")
    }

    pub fn reset(&mut self, args: &ResetArgs) -> Result<()> {
        self.checkpoint();
        let cleared = match args.target {
            ResetTarget::Top => {
                self.engine.reset_top();
                "top buffer"
            }
            ResetTarget::Bottom => {
                self.engine.reset_bottom();
                "bottom buffer"
            }
            ResetTarget::All => {
                self.engine.reset_all();
                "all buffers and manual values"
            }
        };
        println!("Cleared {cleared}");
        self.commit("reset")
    }

    pub fn undo(&mut self) -> Result<()> {
        let Some(previous) = self.history.pop() else {
            println!("Nothing to undo");
            return Ok(());
        };
        self.engine.restore(previous);
        println!("Undone; {} step(s) left", self.history.len());
        self.commit("undo")
    }

    fn code(&self, provided: Option<&str>, key: &str) -> Result<String> {
        match provided.map(str::trim).filter(|v| !v.is_empty()) {
            Some(value) => Ok(value.to_string()),
            None => match self.engine.manual_value(key) {
                Some(value) => Ok(value.to_string()),
                None => bail!("No value for '{key}'; pass it explicitly or set it with `manual`"),
            },
        }
    }
}

fn describe_mapping(engine: &Engine, mapping: &ColumnMapping) -> String {
    let schema = engine.schema();
    let mut lines = String::new();
    for found in &mapping.matches {
        let label = schema.label(&found.key);
        let line = match (&found.header, found.kind) {
            (Some(header), MatchKind::Exact) => format!("{label} <- {header} (exact)"),
            (Some(header), MatchKind::Fuzzy { score }) => {
                format!("{label} <- {header} (fuzzy {score:.2})")
            }
            _ => format!("{label} <- (unmatched)"),
        };
        lines.push_str(&line);
        lines.push('\n');
    }
    lines
}
