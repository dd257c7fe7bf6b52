use std::{
    collections::VecDeque,
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::engine::EngineState;

/// Number of snapshots kept for undo.
pub const HISTORY_DEPTH: usize = 20;

/// Bounded undo stack of engine snapshots; the oldest entry is dropped once
/// [`HISTORY_DEPTH`] is reached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    snapshots: VecDeque<EngineState>,
}

impl History {
    pub fn push(&mut self, state: EngineState) {
        if self.snapshots.len() == HISTORY_DEPTH {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(state);
    }

    pub fn pop(&mut self) -> Option<EngineState> {
        self.snapshots.pop_back()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating history file {path:?}"))?;
        serde_json::to_writer(BufWriter::new(file), self).context("Writing history JSON")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening history file {path:?}"))?;
        let history = serde_json::from_reader(BufReader::new(file)).context("Parsing history JSON")?;
        Ok(history)
    }

    /// Missing history is empty; unreadable history is logged and dropped.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return History::default();
        }
        Self::load(path).unwrap_or_else(|err| {
            warn!("Discarding undo history: {err:#}");
            History::default()
        })
    }
}
