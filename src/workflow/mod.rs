//! Workflow Definition Module
//!
//! Provides the workflow document model, template loading, variable
//! resolution, pre-flight validation and persisted run state.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (StepSpec, WorkflowDocument)
//! - [`parser`]: YAML parsing and loading
//! - [`validator`]: Structural checks against the document shape
//! - [`variables`]: Placeholder parsing and substitution
//! - [`preflight`]: Checks run over all pending steps before execution
//! - [`state`]: Checkpoints for resuming interrupted runs

pub mod model;
pub mod parser;
pub mod preflight;
pub mod state;
pub mod validator;
pub mod variables;

pub use model::{ScalarValue, StepSpec, WorkflowDocument};
pub use parser::{load_template, parse_template};
pub use preflight::{preflight, PreflightReport};
pub use state::{compute_key, ExecutionState, StateStore, StoredState};
pub use validator::{validate_document, SchemaViolation};
pub use variables::{resolve, CommandTemplate, VariableSet, TARGET_VARIABLE};
