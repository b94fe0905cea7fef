//! Variable Resolution
//!
//! Expands `{{ NAME }}` placeholders in step commands:
//! - Tokenizes a command once into literal text and placeholders
//! - Substitutes placeholders by direct lookup in a [`VariableSet`]
//! - Checks the result for leftover `{{` / `}}` markers as a single
//!   post-condition
//!
//! Substitution is single-pass: a value that itself contains `{{ X }}` is
//! inserted verbatim and never expanded again.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::model::WorkflowDocument;
use crate::error::{Result, RunnerError};

/// Name of the variable injected from the run target.
pub const TARGET_VARIABLE: &str = "TARGET";

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Variables available for substitution, all coerced to strings.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct VariableSet(BTreeMap<String, String>);

impl VariableSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the initial set from a document's declared variables and the
    /// run target. `TARGET` always reflects the target argument.
    pub fn from_document(document: &WorkflowDocument, target: &str) -> Self {
        let mut vars: BTreeMap<String, String> = document
            .variables
            .iter()
            .map(|(name, value)| (name.clone(), value.to_string()))
            .collect();
        vars.insert(TARGET_VARIABLE.to_string(), target.to_string());
        Self(vars)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for VariableSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment<'a> {
    Literal(&'a str),
    Placeholder { name: &'a str, raw: &'a str },
}

/// A command split into literal text and placeholders.
#[derive(Debug, Clone)]
pub struct CommandTemplate<'a> {
    segments: Vec<Segment<'a>>,
}

/// Result of rendering a template against a variable set.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub text: String,
    /// Placeholder names with no value, in order of appearance
    pub unresolved: Vec<String>,
    /// True if literal text still carries `{{` or `}}`
    pub stray_markers: bool,
}

impl Rendered {
    /// True when no placeholder or marker survived substitution.
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty() && !self.stray_markers
    }
}

impl<'a> CommandTemplate<'a> {
    /// Splits `text` into segments. Anything that looks like `{{` but does not
    /// enclose a valid name stays literal.
    pub fn parse(text: &'a str) -> Self {
        let mut segments = Vec::new();
        let mut rest = text;

        while let Some(start) = rest.find(OPEN) {
            let after_open = &rest[start + OPEN.len()..];

            let placeholder = after_open.find(CLOSE).and_then(|end| {
                let name = after_open[..end].trim();
                is_variable_name(name).then(|| (name, start + OPEN.len() + end + CLOSE.len()))
            });

            match placeholder {
                Some((name, consumed)) => {
                    if start > 0 {
                        segments.push(Segment::Literal(&rest[..start]));
                    }
                    segments.push(Segment::Placeholder {
                        name,
                        raw: &rest[start..consumed],
                    });
                    rest = &rest[consumed..];
                }
                None => {
                    let literal_end = start + OPEN.len();
                    segments.push(Segment::Literal(&rest[..literal_end]));
                    rest = &rest[literal_end..];
                }
            }
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest));
        }

        Self { segments }
    }

    /// Placeholder names in order of appearance, duplicates included.
    pub fn placeholder_names(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder { name, .. } => Some(*name),
            Segment::Literal(_) => None,
        })
    }

    /// Substitutes every known placeholder. Unknown placeholders are kept in
    /// their original form and reported.
    pub fn render(&self, vars: &VariableSet) -> Rendered {
        let mut text = String::new();
        let mut unresolved = Vec::new();
        let mut stray_markers = false;

        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => {
                    stray_markers |= contains_marker(literal);
                    text.push_str(literal);
                }
                Segment::Placeholder { name, raw } => match vars.get(name) {
                    Some(value) => text.push_str(value),
                    None => {
                        unresolved.push(name.to_string());
                        text.push_str(raw);
                    }
                },
            }
        }

        Rendered {
            text,
            unresolved,
            stray_markers,
        }
    }
}

/// Extracts placeholder names from a command, in order of appearance.
///
/// # Example
/// ```
/// use steprunner::workflow::variables::placeholder_names;
///
/// let names = placeholder_names("nmap -p {{ PORTS }} {{TARGET}}");
/// assert_eq!(names, vec!["PORTS", "TARGET"]);
/// ```
pub fn placeholder_names(command: &str) -> Vec<String> {
    CommandTemplate::parse(command)
        .placeholder_names()
        .map(str::to_string)
        .collect()
}

/// Resolves a step command.
///
/// Fails with [`RunnerError::IncompleteSubstitution`] if any placeholder has
/// no value or a stray marker remains.
pub fn resolve(step_name: &str, command: &str, vars: &VariableSet) -> Result<String> {
    let rendered = CommandTemplate::parse(command).render(vars);

    if !rendered.is_complete() {
        return Err(RunnerError::IncompleteSubstitution {
            step: step_name.to_string(),
            command: rendered.text,
        });
    }

    Ok(rendered.text)
}

/// Checks if a string contains placeholder markers.
pub fn contains_marker(text: &str) -> bool {
    text.contains(OPEN) || text.contains(CLOSE)
}

fn is_variable_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
