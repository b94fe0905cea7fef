//! Workflow Data Model
//!
//! Core data structures representing a workflow document and its steps.
//!
//! # Example YAML Format
//!
//! ```yaml
//! name: recon
//! description: Basic reconnaissance
//! variables:
//!   PORTS: 1-1024
//!   RETRIES: 3
//! steps:
//!   - name: resolve
//!     command: host {{ TARGET }}
//!
//!   - name: scan
//!     command: nmap -p {{ PORTS }} {{ TARGET }}
//!     continue_on_error: true
//!     timeout: 600
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

/// A declared variable value. Documents may use strings, numbers or booleans;
/// all of them are substituted as text. Booleans render as `True`/`False`,
/// floats always carry a fractional part or an exponent.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Integer(i) => write!(f, "{}", i),
            // Debug keeps the fractional part and switches to exponent form
            Self::Float(x) => write!(f, "{:?}", x),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// A single named shell command within a workflow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StepSpec {
    /// Display name of the step
    pub name: String,

    /// Shell command, may contain `{{ VAR }}` placeholders
    pub command: String,

    /// Keep running later steps when this one exits non-zero
    #[serde(default)]
    pub continue_on_error: bool,

    /// Hard deadline for the step, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
}

impl StepSpec {
    /// Creates a step that aborts the run on failure and has no deadline.
    ///
    /// # Example
    ///
    /// ```
    /// use steprunner::workflow::StepSpec;
    ///
    /// let step = StepSpec::new("ping", "ping -c 1 {{ TARGET }}")
    ///     .allow_failure()
    ///     .with_timeout(30.0);
    /// assert!(step.continue_on_error);
    /// ```
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            continue_on_error: false,
            timeout: None,
        }
    }

    /// Marks the step as allowed to fail.
    pub fn allow_failure(mut self) -> Self {
        self.continue_on_error = true;
        self
    }

    /// Sets the step deadline in seconds.
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    /// The enforceable deadline, if one was declared.
    ///
    /// Non-positive, non-finite or unrepresentably large values are treated
    /// as "no deadline".
    pub fn timeout_duration(&self) -> Option<Duration> {
        let secs = self.timeout.filter(|secs| secs.is_finite() && *secs > 0.0)?;

        match Duration::try_from_secs_f64(secs) {
            Ok(limit) => Some(limit),
            Err(e) => {
                warn!("Ignoring timeout of step '{}' ({}s): {}", self.name, secs, e);
                None
            }
        }
    }
}

/// A complete workflow document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowDocument {
    /// Workflow name, part of the state key
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Declared variables
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, ScalarValue>,

    /// Steps in execution order
    pub steps: Vec<StepSpec>,
}

impl WorkflowDocument {
    /// Creates an empty workflow with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            variables: BTreeMap::new(),
            steps: Vec::new(),
        }
    }

    /// Appends a step.
    pub fn with_step(mut self, step: StepSpec) -> Self {
        self.steps.push(step);
        self
    }

    /// Declares a variable.
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Returns the step at a 1-based index.
    pub fn step(&self, index: usize) -> Option<&StepSpec> {
        index.checked_sub(1).and_then(|i| self.steps.get(i))
    }

    /// Iterates steps with their 1-based index.
    pub fn indexed_steps(&self) -> impl Iterator<Item = (usize, &StepSpec)> {
        self.steps.iter().enumerate().map(|(i, step)| (i + 1, step))
    }

    /// Returns the number of steps in the workflow.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the workflow has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
