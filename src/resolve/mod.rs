//! Deferred-attribute resolution
//!
//! # Architecture
//!
//! - [`value`] - Scalars, bindings and deferred values
//! - [`path`] - Field paths and extraction from response documents
//! - [`graph`] - Resource nodes, implicit dependency edges, apply order
//! - [`cache`] - Single-flight lookup cache scoped to one run
//! - [`retry`] - Exponential backoff for transient provider failures
//! - [`engine`] - Runs a plan and produces a [`RunReport`]
//! - [`report`] - Failure taxonomy and per-node terminal states

pub mod cache;
pub mod engine;
pub mod graph;
pub mod path;
pub mod report;
pub mod retry;
pub mod value;

pub use engine::{EngineOptions, ResolutionEngine};
pub use graph::{Attributes, DependencyGraph, GraphError, Plan, Realize, ResourceNode};
pub use path::{extract, resolve, ExtractError, FieldPath};
pub use report::{Failure, FailureKind, NodeState, Origin, RunReport, RunState, SkipReason};
pub use retry::RetryPolicy;
pub use value::{defer, Binding, DeferredValue, NodeId, Scalar, Source};
