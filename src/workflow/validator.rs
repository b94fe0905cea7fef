//! Workflow Validation
//!
//! Structural checks applied to a parsed YAML tree before it is turned into a
//! [`WorkflowDocument`](super::model::WorkflowDocument):
//! - Required fields (`name`, `steps`, and `name`/`command` per step)
//! - Field types (strings, booleans, numbers, scalar variable values)
//! - Non-empty name, step list and step fields
//!
//! Validation stops at the first violation.

use serde_yaml::{Mapping, Value};

use log::debug;

/// Validation error types for user-friendly error messages.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaViolation {
    NotAMapping,
    MissingField(String),
    WrongType { field: String, expected: &'static str },
    EmptyField(String),
    EmptySteps,
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAMapping => write!(f, "document must be a mapping"),
            Self::MissingField(field) => write!(f, "missing required field '{}'", field),
            Self::WrongType { field, expected } => {
                write!(f, "field '{}' must be {}", field, expected)
            }
            Self::EmptyField(field) => write!(f, "field '{}' must not be empty", field),
            Self::EmptySteps => write!(f, "workflow has no steps"),
        }
    }
}

/// Checks a parsed document against the workflow shape.
pub fn validate_document(document: &Value) -> Result<(), SchemaViolation> {
    let root = document.as_mapping().ok_or(SchemaViolation::NotAMapping)?;

    require_string(root, "name", "name")?;

    if let Some(description) = root.get("description") {
        if !description.is_string() && !description.is_null() {
            return Err(SchemaViolation::WrongType {
                field: "description".to_string(),
                expected: "a string",
            });
        }
    }

    if let Some(variables) = root.get("variables") {
        validate_variables(variables)?;
    }

    let steps = root
        .get("steps")
        .ok_or_else(|| SchemaViolation::MissingField("steps".to_string()))?;
    let steps = steps.as_sequence().ok_or_else(|| SchemaViolation::WrongType {
        field: "steps".to_string(),
        expected: "a list",
    })?;

    if steps.is_empty() {
        return Err(SchemaViolation::EmptySteps);
    }

    for (i, step) in steps.iter().enumerate() {
        validate_step(step, i)?;
    }

    debug!("Document shape valid ({} steps)", steps.len());
    Ok(())
}

fn validate_variables(variables: &Value) -> Result<(), SchemaViolation> {
    if variables.is_null() {
        return Ok(());
    }

    let map = variables
        .as_mapping()
        .ok_or_else(|| SchemaViolation::WrongType {
            field: "variables".to_string(),
            expected: "a mapping",
        })?;

    for (key, value) in map {
        let Some(key) = key.as_str() else {
            return Err(SchemaViolation::WrongType {
                field: "variables".to_string(),
                expected: "a mapping with string keys",
            });
        };

        if !(value.is_string() || value.is_number() || value.is_bool()) {
            return Err(SchemaViolation::WrongType {
                field: format!("variables.{}", key),
                expected: "a string, number or boolean",
            });
        }
    }

    Ok(())
}

/// Validates a single step's fields.
fn validate_step(step: &Value, index: usize) -> Result<(), SchemaViolation> {
    let prefix = format!("steps[{}]", index);

    let map = step.as_mapping().ok_or_else(|| SchemaViolation::WrongType {
        field: prefix.clone(),
        expected: "a mapping",
    })?;

    require_string(map, "name", &format!("{}.name", prefix))?;
    require_string(map, "command", &format!("{}.command", prefix))?;

    if let Some(flag) = map.get("continue_on_error") {
        if !flag.is_bool() {
            return Err(SchemaViolation::WrongType {
                field: format!("{}.continue_on_error", prefix),
                expected: "a boolean",
            });
        }
    }

    if let Some(timeout) = map.get("timeout") {
        if !timeout.is_number() {
            return Err(SchemaViolation::WrongType {
                field: format!("{}.timeout", prefix),
                expected: "a number",
            });
        }
    }

    Ok(())
}

fn require_string(map: &Mapping, key: &str, field: &str) -> Result<(), SchemaViolation> {
    let value = map
        .get(key)
        .ok_or_else(|| SchemaViolation::MissingField(field.to_string()))?;

    let text = value.as_str().ok_or_else(|| SchemaViolation::WrongType {
        field: field.to_string(),
        expected: "a string",
    })?;

    if text.trim().is_empty() {
        return Err(SchemaViolation::EmptyField(field.to_string()));
    }

    Ok(())
}
