//! Workflow Execution Module
//!
//! Runs workflow steps one at a time, streaming their output and reacting
//! to operator signals while they run.
//!
//! # Architecture
//!
//! - [`engine`]: Orchestrates a run from pre-flight to the final report
//! - [`step`]: Individual step execution logic
//! - [`operator`]: Interactive input (prompts, confirmation, signals)
//! - [`display`]: Operator-facing terminal output

pub mod display;
pub mod engine;
pub mod operator;
pub mod step;

pub use engine::{Engine, EngineOptions, RunOutcome, RunSummary};
pub use operator::{Operator, OperatorSignal, TerminalOperator};
pub use step::{StepExecutor, StepOutcome};
