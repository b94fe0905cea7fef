//! Workflow State Persistence
//!
//! Checkpoints execution progress so an interrupted run can resume.
//!
//! One JSON file per `(workflow name, target)` pair is kept under the state
//! directory, named after a short hash of the pair. The file is overwritten
//! after every completed step and on interruption. Files are only removed by
//! [`StateStore::clear`].

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::variables::VariableSet;
use crate::error::{Result, RunnerError};

/// Number of hex characters kept from the key hash.
const KEY_LENGTH: usize = 16;

/// Extension of state files.
const STATE_EXTENSION: &str = "json";

/// Persistent state for a workflow execution.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ExecutionState {
    pub workflow_name: String,

    /// Template the run was started from
    pub template_path: String,

    pub target: String,

    /// 1-based indices of steps that completed (or were skipped on request)
    pub completed_steps: BTreeSet<usize>,

    /// Index of the most recent failed step, cleared by the next completion
    #[serde(default)]
    pub failed_step: Option<usize>,

    /// Variables used for substitution
    pub variables: VariableSet,

    /// Last time the state was updated
    pub timestamp: DateTime<Local>,
}

impl ExecutionState {
    /// Creates a new empty state.
    pub fn new(
        workflow_name: &str,
        template_path: &str,
        target: &str,
        variables: VariableSet,
    ) -> Self {
        Self {
            workflow_name: workflow_name.to_string(),
            template_path: template_path.to_string(),
            target: target.to_string(),
            completed_steps: BTreeSet::new(),
            failed_step: None,
            variables,
            timestamp: Local::now(),
        }
    }

    /// The store key for this state.
    pub fn key(&self) -> String {
        compute_key(&self.workflow_name, &self.target)
    }

    /// Marks a step as completed.
    pub fn mark_completed(&mut self, index: usize) {
        self.completed_steps.insert(index);
        self.failed_step = None;
        self.timestamp = Local::now();
    }

    /// Marks a step as failed.
    pub fn mark_failed(&mut self, index: usize) {
        self.failed_step = Some(index);
        self.timestamp = Local::now();
    }

    pub fn is_completed(&self, index: usize) -> bool {
        self.completed_steps.contains(&index)
    }

    /// Highest completed step index, or 0.
    pub fn last_completed(&self) -> usize {
        self.completed_steps.iter().next_back().copied().unwrap_or(0)
    }

    /// Returns true if this state represents a resumed execution.
    pub fn is_resume(&self) -> bool {
        !self.completed_steps.is_empty() || self.failed_step.is_some()
    }
}

/// Deterministic key for a `(workflow name, target)` pair.
///
/// # Example
/// ```
/// use steprunner::workflow::state::compute_key;
///
/// let key = compute_key("recon", "example.com");
/// assert_eq!(key, compute_key("recon", "example.com"));
/// assert_eq!(key.len(), 16);
/// ```
pub fn compute_key(workflow_name: &str, target: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(workflow_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(target.as_bytes());

    let mut key = format!("{:x}", hasher.finalize());
    key.truncate(KEY_LENGTH);
    key
}

/// A state file that could be read back.
#[derive(Debug, Clone)]
pub struct StoredState {
    pub key: String,
    pub state: ExecutionState,
}

/// Owner of the durable state files.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the state file for a key.
    pub fn path_for_key(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, STATE_EXTENSION))
    }

    /// Path of the state file for a `(workflow name, target)` pair.
    pub fn path_for(&self, workflow_name: &str, target: &str) -> PathBuf {
        self.path_for_key(&compute_key(workflow_name, target))
    }

    /// Writes the full state, replacing any previous content.
    pub fn save(&self, state: &ExecutionState) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| RunnerError::State(format!("cannot create {}: {}", self.dir.display(), e)))?;

        let path = self.path_for_key(&state.key());
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| RunnerError::State(format!("cannot serialize state: {}", e)))?;

        // Atomic replace: write a sibling file, then rename over the target.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .and_then(|()| fs::rename(&tmp, &path))
            .map_err(|e| RunnerError::State(format!("cannot write {}: {}", path.display(), e)))?;

        debug!("Saved workflow state to {}", path.display());
        Ok(path)
    }

    /// Loads the state for a pair if it exists and belongs to `template_path`.
    ///
    /// A missing, unreadable or mismatched file yields `None` with a warning;
    /// the caller falls back to a full run.
    pub fn load(
        &self,
        workflow_name: &str,
        target: &str,
        template_path: &str,
    ) -> Option<ExecutionState> {
        let path = self.path_for(workflow_name, target);

        if !path.exists() {
            warn!(
                "No saved state for workflow '{}' and target '{}'; starting from the first step",
                workflow_name, target
            );
            return None;
        }

        let state = match read_state(&path) {
            Ok(state) => state,
            Err(e) => {
                warn!("Ignoring unreadable state file {}: {}", path.display(), e);
                return None;
            }
        };

        if state.template_path != template_path {
            warn!(
                "Saved state was created from '{}', not '{}'; starting from the first step",
                state.template_path, template_path
            );
            return None;
        }

        info!("Loaded workflow state from {}", path.display());
        info!("Previously completed steps: {:?}", state.completed_steps);
        Some(state)
    }

    /// Lists every readable state, newest first. Unparseable files are
    /// skipped with a warning.
    pub fn list(&self) -> Result<Vec<StoredState>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.dir)
            .map_err(|e| RunnerError::State(format!("cannot read {}: {}", self.dir.display(), e)))?;

        let mut states = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(STATE_EXTENSION) {
                continue;
            }

            let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };

            match read_state(&path) {
                Ok(state) => states.push(StoredState { key, state }),
                Err(e) => warn!("Skipping unreadable state file {}: {}", path.display(), e),
            }
        }

        states.sort_by(|a, b| b.state.timestamp.cmp(&a.state.timestamp));
        Ok(states)
    }

    /// Deletes the state for a pair. Returns false if there was none.
    pub fn clear(&self, workflow_name: &str, target: &str) -> Result<bool> {
        let path = self.path_for(workflow_name, target);

        if !path.exists() {
            info!(
                "No saved state for workflow '{}' and target '{}'",
                workflow_name, target
            );
            return Ok(false);
        }

        fs::remove_file(&path)
            .map_err(|e| RunnerError::State(format!("cannot remove {}: {}", path.display(), e)))?;
        info!("Deleted state file: {}", path.display());
        Ok(true)
    }
}

fn read_state(path: &Path) -> std::result::Result<ExecutionState, String> {
    let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&content).map_err(|e| e.to_string())
}
