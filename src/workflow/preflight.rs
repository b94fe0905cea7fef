//! Pre-flight Validation
//!
//! Scans every pending step before anything runs:
//! 1. Placeholder names missing from the variable set
//! 2. Absolute paths in the resolved command that do not exist
//! 3. Leading executables that cannot be found
//!
//! Path and executable checks only run for steps whose placeholders all
//! resolve.

use std::collections::BTreeSet;
use std::path::Path;

use log::debug;

use super::model::StepSpec;
use super::variables::{CommandTemplate, VariableSet};
use crate::environment::{is_resolvable, leading_program};
use crate::error::RunnerError;

/// Issues found by a pre-flight scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreflightReport {
    /// Placeholder names with no value, deduplicated
    pub undefined_vars: BTreeSet<String>,
    /// Missing absolute paths, in order of discovery
    pub invalid_paths: Vec<String>,
    /// Executables not found on the search path, in order of discovery
    pub missing_commands: Vec<String>,
}

impl PreflightReport {
    pub fn has_issues(&self) -> bool {
        !self.undefined_vars.is_empty()
            || !self.invalid_paths.is_empty()
            || !self.missing_commands.is_empty()
    }

    /// True when only path or executable warnings remain.
    pub fn needs_confirmation(&self) -> bool {
        !self.invalid_paths.is_empty() || !self.missing_commands.is_empty()
    }

    /// Path and executable issues as the errors they classify as.
    pub fn warnings(&self) -> impl Iterator<Item = RunnerError> + '_ {
        let paths = self.invalid_paths.iter().cloned().map(RunnerError::InvalidPath);
        let commands = self
            .missing_commands
            .iter()
            .cloned()
            .map(RunnerError::MissingExecutable);
        paths.chain(commands)
    }
}

/// Runs all checks over the given steps.
pub fn preflight<'a>(
    steps: impl IntoIterator<Item = &'a StepSpec>,
    vars: &VariableSet,
) -> PreflightReport {
    let mut report = PreflightReport::default();

    for step in steps {
        let template = CommandTemplate::parse(&step.command);
        let rendered = template.render(vars);

        if !rendered.unresolved.is_empty() {
            debug!(
                "Step '{}' has undefined variables: {:?}",
                step.name, rendered.unresolved
            );
            report.undefined_vars.extend(rendered.unresolved);
            continue;
        }

        let missing_paths = absolute_paths(&rendered.text).filter(|p| !Path::new(p).exists());
        report.invalid_paths.extend(missing_paths.map(str::to_string));

        if let Some(program) = leading_program(&rendered.text) {
            if !program.starts_with('/') && !is_resolvable(program) {
                report.missing_commands.push(program.to_string());
            }
        }
    }

    report
}

/// Whitespace-delimited tokens that start with `/`.
fn absolute_paths(command: &str) -> impl Iterator<Item = &str> {
    command.split_whitespace().filter(|token| token.starts_with('/'))
}
