//! Deferred values
//!
//! A [`DeferredValue`] stands in for a scalar that only exists once an
//! external lookup has run or a resource has been realized. Building one
//! never performs I/O; the engine resolves it when a consumer needs it.

use super::path::FieldPath;
use crate::lookup::LookupSpec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Identifier of a declared resource node
pub type NodeId = String;

/// A concrete, fully resolved value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

impl Scalar {
    /// Convert a JSON leaf into a scalar. Returns `None` for null, arrays and objects.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) => Value::String(s.clone()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

/// Where a deferred value comes from
#[derive(Debug, Clone)]
pub enum Source {
    /// A field of an external lookup's response document
    Lookup { spec: Arc<LookupSpec>, path: FieldPath },
    /// An attribute a resource exposes once realized
    Node { node: NodeId, attribute: String },
}

/// A scalar that is not known until its producer has run
#[derive(Debug, Clone)]
pub struct DeferredValue {
    source: Source,
    placeholder: Option<String>,
}

impl DeferredValue {
    pub fn from_lookup(spec: Arc<LookupSpec>, path: FieldPath) -> Self {
        Self {
            source: Source::Lookup { spec, path },
            placeholder: None,
        }
    }

    pub fn from_node(node: impl Into<NodeId>, attribute: impl Into<String>) -> Self {
        Self {
            source: Source::Node {
                node: node.into(),
                attribute: attribute.into(),
            },
            placeholder: None,
        }
    }

    /// Attach a display-only placeholder. It is never used as a resolved value.
    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn placeholder(&self) -> Option<&str> {
        self.placeholder.as_deref()
    }

    /// Human readable description of the producer and path
    pub fn describe(&self) -> String {
        match &self.source {
            Source::Lookup { spec, path } => format!("{}:{}", spec.identity(), path),
            Source::Node { node, attribute } => format!("{}.{}", node, attribute),
        }
    }
}

impl fmt::Display for DeferredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.placeholder {
            Some(p) => write!(f, "${{{}}}", p),
            None => write!(f, "${{{}}}", self.describe()),
        }
    }
}

/// Build a deferred value for one field of a lookup's eventual response
pub fn defer(spec: &Arc<LookupSpec>, path: FieldPath) -> DeferredValue {
    DeferredValue::from_lookup(Arc::clone(spec), path)
}

/// An input to a lookup or resource: either known now, or deferred
#[derive(Debug, Clone)]
pub enum Binding {
    Value(Scalar),
    Deferred(DeferredValue),
}

impl Binding {
    pub fn as_deferred(&self) -> Option<&DeferredValue> {
        match self {
            Self::Deferred(d) => Some(d),
            Self::Value(_) => None,
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{}", v),
            Self::Deferred(d) => write!(f, "{}", d),
        }
    }
}

impl From<Scalar> for Binding {
    fn from(value: Scalar) -> Self {
        Self::Value(value)
    }
}

impl From<DeferredValue> for Binding {
    fn from(value: DeferredValue) -> Self {
        Self::Deferred(value)
    }
}

impl From<&str> for Binding {
    fn from(value: &str) -> Self {
        Self::Value(value.into())
    }
}

impl From<String> for Binding {
    fn from(value: String) -> Self {
        Self::Value(value.into())
    }
}
