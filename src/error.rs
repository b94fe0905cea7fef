//! Error Taxonomy
//!
//! Every fatal condition a run can hit is a [`RunnerError`] variant. Each
//! variant carries a short classification label (see [`RunnerError::label`])
//! that is printed next to the cause text.
//!
//! Expected terminations (operator declined, operator interrupt) are not
//! errors; they are reported through
//! [`RunOutcome`](crate::execution::RunOutcome).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Errors that abort a command invocation.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The template path does not exist.
    #[error("template not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The template is not well-formed YAML.
    #[error("failed to parse '{}': {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    /// The template does not match the workflow document shape.
    #[error("'{}' does not match the workflow schema: {violation}", .path.display())]
    Schema { path: PathBuf, violation: String },

    /// Variables still undefined after the operator was prompted.
    #[error("undefined variables: {}", .0.join(", "))]
    UndefinedVariable(Vec<String>),

    /// An absolute path referenced by a step does not exist.
    #[error("path does not exist: {0}")]
    InvalidPath(String),

    /// A step's executable cannot be found on the search path.
    #[error("executable not found: {0}")]
    MissingExecutable(String),

    /// Placeholders survived substitution.
    #[error("step '{step}' has unresolved placeholders after substitution: {command}")]
    IncompleteSubstitution { step: String, command: String },

    /// A step exited non-zero and was not allowed to continue.
    #[error("step {index} '{step}' failed{}: {cause}", exit_suffix(.code))]
    StepFailure {
        index: usize,
        step: String,
        code: Option<i32>,
        cause: String,
    },

    /// The step's process could not be started.
    #[error("failed to start step '{step}': {source}")]
    Spawn {
        step: String,
        #[source]
        source: io::Error,
    },

    /// A state file could not be read, written or removed.
    #[error("state store error: {0}")]
    State(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" with exit code {}", code),
        None => String::new(),
    }
}

impl RunnerError {
    /// Classification label shown to the operator.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NotFound",
            Self::Parse { .. } => "ParseError",
            Self::Schema { .. } => "SchemaError",
            Self::UndefinedVariable(_) => "UndefinedVariable",
            Self::InvalidPath(_) => "InvalidPath",
            Self::MissingExecutable(_) => "MissingExecutable",
            Self::IncompleteSubstitution { .. } => "IncompleteSubstitution",
            Self::StepFailure { .. } => "StepFailure",
            Self::Spawn { .. } => "SpawnError",
            Self::State(_) => "StateError",
            Self::Io(_) => "IoError",
        }
    }

    /// True for errors raised before any step could have run.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Parse { .. } | Self::Schema { .. } | Self::UndefinedVariable(_)
        )
    }
}
