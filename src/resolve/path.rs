//! Field paths and extraction
//!
//! Paths use dot notation. All-digit segments index into arrays, `*` selects
//! the single element of an array, anything else is an object key:
//!
//! ```text
//! VpcEndpoints.*.DnsEntries.0.DnsName
//! ```

use super::value::{DeferredValue, Scalar, Source};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One step of a [`FieldPath`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
    Key(String),
    Index(usize),
    /// Exactly one element must be present
    Single,
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => f.write_str(k),
            Self::Index(i) => write!(f, "{}", i),
            Self::Single => f.write_str("*"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid field path '{path}': {reason}")]
pub struct PathError {
    pub path: String,
    pub reason: &'static str,
}

/// A path into a nested response document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    steps: Vec<PathStep>,
}

impl FieldPath {
    pub fn parse(path: &str) -> Result<Self, PathError> {
        if path.is_empty() {
            return Err(PathError {
                path: path.to_string(),
                reason: "path is empty",
            });
        }

        let mut steps = Vec::new();
        for part in path.split('.') {
            let step = match part {
                "" => {
                    return Err(PathError {
                        path: path.to_string(),
                        reason: "empty segment",
                    })
                }
                "*" => PathStep::Single,
                _ if part.bytes().all(|b| b.is_ascii_digit()) => match part.parse() {
                    Ok(idx) => PathStep::Index(idx),
                    Err(_) => {
                        return Err(PathError {
                            path: path.to_string(),
                            reason: "array index out of range",
                        })
                    }
                },
                _ => PathStep::Key(part.to_string()),
            };
            steps.push(step);
        }

        Ok(Self { steps })
    }

    /// A single-key path
    pub fn key(name: impl Into<String>) -> Self {
        Self {
            steps: vec![PathStep::Key(name.into())],
        }
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    fn prefix(&self, len: usize) -> String {
        self.steps[..len]
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix(self.steps.len()))
    }
}

/// Why a field could not be extracted from a document
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind")]
pub enum ExtractError {
    #[error("field not found at '{at}' (path {path})")]
    FieldNotFound { path: String, at: String },
    #[error("type mismatch at '{at}' (path {path}): expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        at: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("ambiguous field at '{at}' (path {path}): expected exactly one element, found {count}")]
    Ambiguous {
        path: String,
        at: String,
        count: usize,
    },
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Walk `path` through `document` and return the scalar at its end
pub fn extract(path: &FieldPath, document: &Value) -> Result<Scalar, ExtractError> {
    let not_found = |len: usize| ExtractError::FieldNotFound {
        path: path.to_string(),
        at: path.prefix(len),
    };
    let mismatch = |len: usize, expected: &'static str, found: &Value| ExtractError::TypeMismatch {
        path: path.to_string(),
        at: path.prefix(len),
        expected,
        found: kind_of(found),
    };

    let mut current = document;
    for (i, step) in path.steps().iter().enumerate() {
        let len = i + 1;
        current = match (step, current) {
            (_, Value::Null) => return Err(not_found(len)),
            (PathStep::Key(key), Value::Object(map)) => {
                map.get(key).ok_or_else(|| not_found(len))?
            }
            (PathStep::Key(_), other) => return Err(mismatch(len, "object", other)),
            (PathStep::Index(idx), Value::Array(items)) => {
                items.get(*idx).ok_or_else(|| not_found(len))?
            }
            (PathStep::Single, Value::Array(items)) => match items.as_slice() {
                [] => return Err(not_found(len)),
                [only] => only,
                _ => {
                    return Err(ExtractError::Ambiguous {
                        path: path.to_string(),
                        at: path.prefix(len),
                        count: items.len(),
                    })
                }
            },
            (PathStep::Index(_) | PathStep::Single, other) => {
                return Err(mismatch(len, "array", other))
            }
        };
    }

    match current {
        Value::Null => Err(not_found(path.steps().len())),
        Value::Array(_) | Value::Object(_) => {
            Err(mismatch(path.steps().len(), "scalar", current))
        }
        leaf => Scalar::from_json(leaf).ok_or_else(|| not_found(path.steps().len())),
    }
}

/// Resolve a lookup-sourced deferred value against its lookup's response
pub fn resolve(value: &DeferredValue, result: &Value) -> Result<Scalar, ExtractError> {
    match value.source() {
        Source::Lookup { path, .. } => extract(path, result),
        Source::Node { attribute, .. } => extract(&FieldPath::key(attribute.clone()), result),
    }
}
