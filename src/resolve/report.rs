//! Run outcome: failure taxonomy, per-node terminal states and the run report

use super::path::ExtractError;
use super::value::{NodeId, Scalar};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use thiserror::Error;

/// Why a lookup, a node or a stack output failed
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureKind {
    #[error(transparent)]
    Extract { error: ExtractError },
    #[error("permanent failure: {message}")]
    Permanent { message: String },
    #[error("transient failure persisted after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },
    /// A deferred value was read before its producer ran
    #[error("{value} read before its producer was realized")]
    EarlyRead { value: String },
    #[error("no adapter registered for lookup kind '{kind}'")]
    UnknownKind { kind: String },
    /// A realized attribute defers, directly or through other attributes,
    /// back to itself
    #[error("attribute cycle: {}", chain.join(" -> "))]
    CyclicAttribute { chain: Vec<String> },
}

impl FailureKind {
    /// Short name used in reports
    pub fn name(&self) -> &'static str {
        match self {
            Self::Extract {
                error: ExtractError::FieldNotFound { .. },
            } => "FieldNotFound",
            Self::Extract {
                error: ExtractError::TypeMismatch { .. },
            } => "TypeMismatch",
            Self::Extract {
                error: ExtractError::Ambiguous { .. },
            } => "Ambiguous",
            Self::Permanent { .. } => "Permanent",
            Self::RetriesExhausted { .. } => "Transient",
            Self::EarlyRead { .. } => "EarlyRead",
            Self::UnknownKind { .. } => "UnknownKind",
            Self::CyclicAttribute { .. } => "CyclicAttribute",
        }
    }
}

impl From<ExtractError> for FailureKind {
    fn from(error: ExtractError) -> Self {
        Self::Extract { error }
    }
}

/// What the failure originated from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Origin {
    Node(NodeId),
    Lookup(String),
    Output(String),
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Node(id) => write!(f, "node {}", id),
            Self::Lookup(key) => write!(f, "lookup {}", key),
            Self::Output(name) => write!(f, "output {}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{origin}: {kind}")]
pub struct Failure {
    pub origin: Origin,
    pub kind: FailureKind,
}

impl Failure {
    pub fn node(id: &str, kind: FailureKind) -> Self {
        Self {
            origin: Origin::Node(id.to_string()),
            kind,
        }
    }

    pub fn lookup(key: impl ToString, kind: FailureKind) -> Self {
        Self {
            origin: Origin::Lookup(key.to_string()),
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Resolving,
    Resolved,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "node", rename_all = "snake_case")]
pub enum SkipReason {
    /// A node this one (transitively) depends on failed
    UpstreamFailed(NodeId),
    /// The run stopped scheduling after a failure elsewhere
    Halted,
}

/// Terminal state of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NodeState {
    Resolved,
    Failed { failure: Failure },
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub id: NodeId,
    #[serde(flatten)]
    pub state: NodeState,
}

/// Result of one engine run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub state: RunState,
    pub started_at: String,
    pub finished_at: String,
    /// Every node, in plan order
    pub nodes: Vec<NodeReport>,
    /// Nodes in the order their realization completed
    pub realized: Vec<NodeId>,
    /// Resolved stack outputs
    pub outputs: BTreeMap<String, Scalar>,
    /// Stack outputs that could not be resolved
    pub output_failures: Vec<Failure>,
    /// Number of external lookup executions (cache misses)
    pub lookup_executions: usize,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.state == RunState::Resolved
    }

    pub fn node(&self, id: &str) -> Option<&NodeState> {
        self.nodes.iter().find(|n| n.id == id).map(|n| &n.state)
    }

    /// All failures: failed nodes first, then outputs
    pub fn failures(&self) -> Vec<&Failure> {
        self.nodes
            .iter()
            .filter_map(|n| match &n.state {
                NodeState::Failed { failure } => Some(failure),
                _ => None,
            })
            .chain(self.output_failures.iter())
            .collect()
    }

    /// Plain-text summary for the terminal
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "run {} {:?}", self.run_id, self.state);

        for node in &self.nodes {
            let line = match &node.state {
                NodeState::Resolved => "resolved".to_string(),
                NodeState::Failed { failure } => {
                    format!("FAILED {} ({})", failure.kind.name(), failure)
                }
                NodeState::Skipped {
                    reason: SkipReason::UpstreamFailed(up),
                } => format!("skipped (upstream {} failed)", up),
                NodeState::Skipped {
                    reason: SkipReason::Halted,
                } => "skipped (run halted)".to_string(),
            };
            let _ = writeln!(out, "  {:<40} {}", node.id, line);
        }

        if !self.outputs.is_empty() {
            let _ = writeln!(out, "outputs:");
            for (name, value) in &self.outputs {
                let _ = writeln!(out, "  {} = {}", name, value);
            }
        }
        for failure in &self.output_failures {
            let _ = writeln!(out, "  FAILED {} ({})", failure.kind.name(), failure);
        }

        let _ = writeln!(out, "{} lookup(s) executed", self.lookup_executions);
        out
    }
}
