//! Persistence of [`EngineState`] behind the [`StateStore`] trait.
//!
//! [`JsonDirStore`] keeps one JSON document per artifact inside a directory:
//!
//! | artifact | file |
//! |---|---|
//! | system (top) table | `system.json` |
//! | staged (bottom) table | `staged.json` |
//! | processed table | `processed.json` |
//! | file lists, manual values, metadata | `config.json` |
//!
//! Loading is tolerant: a missing file is an empty artifact and a corrupt one
//! is logged and treated the same way. Saving writes every artifact to a
//! `.tmp` sibling first and only renames them into place once all of them
//! were written, so a failed save leaves the previous files untouched.

use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::{engine::EngineState, table::Table};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON in {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("state store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    System,
    Staged,
    Processed,
    Config,
}

impl Artifact {
    pub const ALL: [Artifact; 4] = [
        Artifact::System,
        Artifact::Staged,
        Artifact::Processed,
        Artifact::Config,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Artifact::System => "system.json",
            Artifact::Staged => "staged.json",
            Artifact::Processed => "processed.json",
            Artifact::Config => "config.json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveMetadata {
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl SaveMetadata {
    pub fn now() -> Self {
        Self {
            saved_at: Utc::now(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, key: &str, value: impl Into<String>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}

pub trait StateStore {
    fn load(&self) -> Result<EngineState, StoreError>;
    fn save(&mut self, state: &EngineState, metadata: &SaveMetadata) -> Result<(), StoreError>;
    fn discard(&mut self, artifacts: &[Artifact]) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    loaded_files_top: Vec<String>,
    #[serde(default)]
    loaded_files_bottom: Vec<String>,
    #[serde(default)]
    manual_values: BTreeMap<String, String>,
    #[serde(default)]
    metadata: Option<SaveMetadata>,
}

#[derive(Debug, Clone)]
pub struct JsonDirStore {
    root: PathBuf,
}

impl JsonDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, artifact: Artifact) -> PathBuf {
        self.root.join(artifact.file_name())
    }

    /// Reads an artifact; missing and corrupt files both give `None`.
    fn read_artifact<T: DeserializeOwned>(&self, artifact: Artifact) -> Option<T> {
        let path = self.path(artifact);
        if !path.exists() {
            return None;
        }
        match read_json(&path) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("Ignoring unreadable {}: {err}", artifact.file_name());
                None
            }
        }
    }

    /// Writes every non-empty artifact to its temp path, returning
    /// `(temp, final)` pairs and the artifacts whose files should go away.
    fn stage(
        &self,
        state: &EngineState,
        metadata: &SaveMetadata,
        staged: &mut Vec<(PathBuf, PathBuf)>,
    ) -> Result<Vec<Artifact>, StoreError> {
        let mut emptied = Vec::new();
        let tables = [
            (Artifact::System, state.top_table.as_ref()),
            (Artifact::Staged, state.staged_table.as_ref()),
            (Artifact::Processed, state.processed_table.as_ref()),
        ];
        for (artifact, table) in tables {
            match table.filter(|t| !t.is_empty()) {
                Some(table) => staged.push(self.stage_json(artifact, table)?),
                None => emptied.push(artifact),
            }
        }
        let config = ConfigDocument {
            loaded_files_top: state.loaded_files_top.clone(),
            loaded_files_bottom: state.loaded_files_bottom.clone(),
            manual_values: state.manual_values.clone(),
            metadata: Some(metadata.clone()),
        };
        staged.push(self.stage_json(Artifact::Config, &config)?);
        Ok(emptied)
    }

    fn stage_json<T: Serialize>(
        &self,
        artifact: Artifact,
        value: &T,
    ) -> Result<(PathBuf, PathBuf), StoreError> {
        let path = self.path(artifact);
        let temp = path.with_extension("json.tmp");
        write_json(&temp, value)?;
        Ok((temp, path))
    }
}

impl StateStore for JsonDirStore {
    fn load(&self) -> Result<EngineState, StoreError> {
        let config = self
            .read_artifact::<ConfigDocument>(Artifact::Config)
            .unwrap_or_default();
        if let Some(metadata) = &config.metadata {
            debug!("Loading state saved at {}", metadata.saved_at.to_rfc3339());
        }
        Ok(EngineState {
            top_table: self.read_artifact(Artifact::System),
            staged_table: self.read_artifact(Artifact::Staged),
            processed_table: self.read_artifact(Artifact::Processed),
            loaded_files_top: config.loaded_files_top,
            loaded_files_bottom: config.loaded_files_bottom,
            manual_values: config.manual_values,
        })
    }

    fn save(&mut self, state: &EngineState, metadata: &SaveMetadata) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root).map_err(|source| StoreError::Io {
            path: self.root.clone(),
            source,
        })?;
        let mut staged = Vec::new();
        let emptied = match self.stage(state, metadata, &mut staged) {
            Ok(emptied) => emptied,
            Err(err) => {
                for (temp, _) in &staged {
                    let _ = fs::remove_file(temp);
                }
                return Err(err);
            }
        };
        for (temp, path) in staged {
            fs::rename(&temp, &path).map_err(|source| StoreError::Io { path, source })?;
        }
        for artifact in emptied {
            remove_if_present(&self.path(artifact))?;
        }
        debug!("Saved state to {:?}", self.root);
        Ok(())
    }

    fn discard(&mut self, artifacts: &[Artifact]) -> Result<(), StoreError> {
        for artifact in artifacts {
            remove_if_present(&self.path(*artifact))?;
        }
        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let file = File::open(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let file = File::create(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(StoreError::Io {
            path: path.to_path_buf(),
            source: err,
        }),
        _ => Ok(()),
    }
}

/// Keeps the last saved state in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: EngineState,
    last_metadata: Option<SaveMetadata>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: EngineState) -> Self {
        Self {
            state,
            last_metadata: None,
        }
    }

    pub fn last_metadata(&self) -> Option<&SaveMetadata> {
        self.last_metadata.as_ref()
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<EngineState, StoreError> {
        Ok(self.state.clone())
    }

    fn save(&mut self, state: &EngineState, metadata: &SaveMetadata) -> Result<(), StoreError> {
        self.state = state.clone();
        self.last_metadata = Some(metadata.clone());
        Ok(())
    }

    fn discard(&mut self, artifacts: &[Artifact]) -> Result<(), StoreError> {
        for artifact in artifacts {
            match artifact {
                Artifact::System => self.state.top_table = None,
                Artifact::Staged => self.state.staged_table = None,
                Artifact::Processed => self.state.processed_table = None,
                Artifact::Config => {
                    self.state.loaded_files_top.clear();
                    self.state.loaded_files_bottom.clear();
                    self.state.manual_values.clear();
                }
            }
        }
        Ok(())
    }
}
