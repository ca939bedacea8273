//! Program persistence.
//!
//! `ProgramStore` is the seam between the registry and whatever holds the
//! programs. Two backends ship with the crate:
//! - `MemoryProgramStore`: a `HashMap` behind a mutex, for tests and dry runs
//! - `JsonDirProgramStore`: one pretty-printed JSON file per program
//!
//! Stores persist whole programs. Concurrency control lives in
//! [`crate::registry`], not here.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::domain::error::{PlanningError, Result};
use crate::domain::program::{AnnualProgram, ProgramKey};

/// Async persistence for annual programs, keyed by (executor, year).
#[async_trait]
pub trait ProgramStore: Send + Sync {
    /// Load a program. `Ok(None)` when absent.
    async fn load(&self, key: &ProgramKey) -> Result<Option<AnnualProgram>>;

    /// Insert or replace a program.
    async fn save(&self, program: &AnnualProgram) -> Result<()>;

    /// Every stored key, sorted.
    async fn list_keys(&self) -> Result<Vec<ProgramKey>>;
}

fn storage<E: std::fmt::Display>(context: &str) -> impl FnOnce(E) -> PlanningError + '_ {
    move |e| PlanningError::Storage(format!("{context}: {e}"))
}

// ---------------------------------------------------------------------------
// MemoryProgramStore
// ---------------------------------------------------------------------------

/// In-memory store backed by a `HashMap<ProgramKey, AnnualProgram>`.
#[derive(Debug, Default)]
pub struct MemoryProgramStore {
    programs: Mutex<HashMap<ProgramKey, AnnualProgram>>,
}

impl MemoryProgramStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, HashMap<ProgramKey, AnnualProgram>>> {
        self.programs
            .lock()
            .map_err(|_| PlanningError::Storage("memory store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl ProgramStore for MemoryProgramStore {
    async fn load(&self, key: &ProgramKey) -> Result<Option<AnnualProgram>> {
        Ok(self.guard()?.get(key).cloned())
    }

    async fn save(&self, program: &AnnualProgram) -> Result<()> {
        self.guard()?.insert(program.key(), program.clone());
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<ProgramKey>> {
        let mut keys: Vec<ProgramKey> = self.guard()?.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

// ---------------------------------------------------------------------------
// JsonDirProgramStore
// ---------------------------------------------------------------------------

/// Directory of program files.
///
/// Layout: `<root>/<executor_id>-<year>.json`
#[derive(Debug, Clone)]
pub struct JsonDirProgramStore {
    root: PathBuf,
}

impl JsonDirProgramStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(storage("create store directory"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn program_path(&self, key: &ProgramKey) -> Result<PathBuf> {
        let executor = key.executor_id.as_str();
        if executor.is_empty()
            || executor.starts_with('.')
            || executor.contains(['/', '\\'])
        {
            return Err(PlanningError::Storage(format!(
                "executor id '{executor}' cannot be used as a file name"
            )));
        }
        Ok(self.root.join(format!("{executor}-{}.json", key.year)))
    }
}

/// Parse `<executor>-<year>.json`. Executor ids may contain `-`.
fn key_from_file_name(name: &str) -> Option<ProgramKey> {
    let stem = name.strip_suffix(".json")?;
    let (executor, year) = stem.rsplit_once('-')?;
    let year = year.parse().ok()?;
    (!executor.is_empty()).then(|| ProgramKey::new(executor, year))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| std::io::Error::other("program path has no parent"))?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl ProgramStore for JsonDirProgramStore {
    async fn load(&self, key: &ProgramKey) -> Result<Option<AnnualProgram>> {
        let path = self.program_path(key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage("read program")(e)),
        };
        let program: AnnualProgram =
            serde_json::from_slice(&bytes).map_err(storage("decode program"))?;
        if program.key() != *key {
            return Err(PlanningError::Storage(format!(
                "{} holds program {}, expected {key}",
                path.display(),
                program.key()
            )));
        }
        Ok(Some(program))
    }

    async fn save(&self, program: &AnnualProgram) -> Result<()> {
        let path = self.program_path(&program.key())?;
        let bytes = serde_json::to_vec_pretty(program).map_err(storage("encode program"))?;
        debug!(path = %path.display(), bytes = bytes.len(), "saving program");
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(storage("join writer"))?
            .map_err(storage("write program"))
    }

    async fn list_keys(&self) -> Result<Vec<ProgramKey>> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(storage("list store directory"))?;
        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(storage("list store directory"))?
        {
            if let Some(key) = entry.file_name().to_str().and_then(key_from_file_name) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
