//! Workflow Parser
//!
//! Loads workflow documents from YAML files. Loading is all-or-nothing: the
//! document is parsed into a generic tree, checked against the workflow shape,
//! and only then converted into a [`WorkflowDocument`].

use std::fs;
use std::path::Path;

use log::{debug, info};
use serde_yaml::Value;

use super::model::WorkflowDocument;
use super::validator::validate_document;
use crate::error::{Result, RunnerError};

/// Loads and validates a workflow document from a YAML file.
///
/// # Errors
///
/// * [`RunnerError::NotFound`] - the path does not exist
/// * [`RunnerError::Parse`] - the file is not well-formed YAML
/// * [`RunnerError::Schema`] - the first structural violation found
///
/// # Example
///
/// ```rust,no_run
/// use steprunner::workflow::load_template;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let doc = load_template("recon.yaml")?;
///     println!("Loaded {} steps", doc.steps.len());
///     Ok(())
/// }
/// ```
pub fn load_template(path: impl AsRef<Path>) -> Result<WorkflowDocument> {
    let path = path.as_ref();
    info!("Loading workflow from: {}", path.display());

    if !path.exists() {
        return Err(RunnerError::NotFound(path.to_path_buf()));
    }

    let yaml_content = fs::read_to_string(path)?;
    debug!("YAML content loaded ({} bytes)", yaml_content.len());

    parse_template(&yaml_content, path)
}

/// Parses and validates YAML text. `origin` is used for error messages only.
pub fn parse_template(yaml_content: &str, origin: &Path) -> Result<WorkflowDocument> {
    let tree: Value = serde_yaml::from_str(yaml_content).map_err(|e| RunnerError::Parse {
        path: origin.to_path_buf(),
        message: e.to_string(),
    })?;

    validate_document(&tree).map_err(|violation| RunnerError::Schema {
        path: origin.to_path_buf(),
        violation: violation.to_string(),
    })?;

    let document: WorkflowDocument =
        serde_yaml::from_value(tree).map_err(|e| RunnerError::Schema {
            path: origin.to_path_buf(),
            violation: e.to_string(),
        })?;

    info!(
        "Parsed workflow '{}' with {} steps, {} variables",
        document.name,
        document.steps.len(),
        document.variables.len()
    );

    Ok(document)
}
