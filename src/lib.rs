//! stackwire: deferred-attribute resolution for declarative infrastructure stacks
//!
//! # Architecture
//!
//! - [`resolve`] - Deferred values, dependency graph and the resolution engine
//! - [`lookup`] - Describe lookups and the adapters that execute them
//! - [`provider`] - HTTP access to the provider API
//! - [`stack`] - YAML stack files compiled into a dependency graph
//! - [`config`] - User configuration

pub mod config;
pub mod lookup;
pub mod provider;
pub mod resolve;
pub mod stack;

pub use resolve::{
    Binding, DeferredValue, DependencyGraph, EngineOptions, ResolutionEngine, RunReport, Scalar,
};
