//! Lookup specifications and their cache identity

use crate::resolve::path::{FieldPath, PathError};
use crate::resolve::value::{defer, Binding, DeferredValue};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Description of one external read
///
/// Built once with the consuming `with_*` methods, then shared behind an
/// `Arc` so deferred values can point back at it.
#[derive(Debug, Clone)]
pub struct LookupSpec {
    kind: String,
    identifiers: Vec<Binding>,
    filters: BTreeMap<String, Vec<String>>,
    fields: Vec<FieldPath>,
}

impl LookupSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            identifiers: Vec::new(),
            filters: BTreeMap::new(),
            fields: Vec::new(),
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<Binding>) -> Self {
        self.identifiers.push(identifier.into());
        self
    }

    pub fn with_filter(mut self, name: impl Into<String>, values: Vec<String>) -> Self {
        self.filters.entry(name.into()).or_default().extend(values);
        self
    }

    /// Declare a field the caller will extract. Once any field is declared,
    /// only declared fields may be deferred from this lookup.
    pub fn with_field(mut self, path: FieldPath) -> Self {
        if !self.fields.contains(&path) {
            self.fields.push(path);
        }
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn identifiers(&self) -> &[Binding] {
        &self.identifiers
    }

    pub fn filters(&self) -> &BTreeMap<String, Vec<String>> {
        &self.filters
    }

    pub fn fields(&self) -> &[FieldPath] {
        &self.fields
    }

    pub fn declares(&self, path: &FieldPath) -> bool {
        self.fields.is_empty() || self.fields.contains(path)
    }

    /// Declared identity, with deferred identifiers shown as placeholders
    pub fn identity(&self) -> String {
        let ids = self
            .identifiers
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>();
        format_identity(&self.kind, &ids, &self.filters)
    }
}

/// Deferred value for one response field of a shared lookup
pub fn response_field(spec: &Arc<LookupSpec>, path: &str) -> Result<DeferredValue, PathError> {
    Ok(defer(spec, FieldPath::parse(path)?))
}

fn format_identity(
    kind: &str,
    identifiers: &[String],
    filters: &BTreeMap<String, Vec<String>>,
) -> String {
    let mut out = format!("{}({})", kind, identifiers.join(","));
    if !filters.is_empty() {
        let rendered = filters
            .iter()
            .map(|(k, v)| format!("{}={}", k, v.join("|")))
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&format!("[{}]", rendered));
    }
    out
}

/// Cache identity of a lookup whose identifiers have been resolved
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LookupKey {
    pub kind: String,
    pub identifiers: Vec<String>,
    pub filters: BTreeMap<String, Vec<String>>,
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_identity(&self.kind, &self.identifiers, &self.filters))
    }
}

/// What an adapter receives: the resolved key plus the requested fields
#[derive(Debug, Clone)]
pub struct LookupRequest {
    pub key: LookupKey,
    pub fields: Vec<FieldPath>,
}
