//! StepRunner - Declarative Workflow Runner
//!
//! Reads a YAML-described sequence of shell steps, substitutes variables,
//! executes each step as a child process while streaming its output, and
//! checkpoints progress so an interrupted run can resume where it stopped.
//!
//! # Architecture
//!
//! The library is organized into four main modules plus the error taxonomy:
//!
//! - [`workflow`]: Document model, loading, variables, pre-flight and state
//! - [`execution`]: Sequential execution engine and operator interaction
//! - [`environment`]: On-disk layout and executable lookup
//! - [`monitoring`]: Execution timeline and run reports
//! - [`error`]: [`RunnerError`] and its classification labels
//!
//! # Example
//!
//! ```rust,no_run
//! use steprunner::execution::{Engine, RunOutcome, TerminalOperator};
//! use steprunner::Config;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::discover(None);
//!     config.ensure_dirs()?;
//!
//!     let mut engine = Engine::new(&config, Box::new(TerminalOperator::new(false)));
//!     engine.set_dry_run(true);
//!
//!     let outcome = engine.run("recon.yaml", "example.com").await?;
//!     assert_eq!(outcome, RunOutcome::DryRun);
//!     Ok(())
//! }
//! ```

pub mod environment;
pub mod error;
pub mod execution;
pub mod monitoring;
pub mod workflow;

// Re-export commonly used types
pub use environment::Config;
pub use error::{Result, RunnerError};
pub use execution::engine::{Engine, RunOutcome};
pub use workflow::model::{StepSpec, WorkflowDocument};
pub use workflow::parser::load_template;
pub use workflow::state::StateStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "StepRunner";
