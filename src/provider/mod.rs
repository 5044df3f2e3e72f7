//! Provider API interaction module
//!
//! Everything that talks to the infrastructure provider over HTTP: the
//! client, failure classification, and the realizer that creates resources.
//!
//! # Module Structure
//!
//! - [`client`] - Endpoint-aware client used by adapters and realizers
//! - [`error`] - Transient/permanent classification of provider failures
//! - [`http`] - HTTP utilities for REST API calls
//! - [`realizer`] - Realizes resource nodes by POSTing their resolved inputs

pub mod client;
pub mod error;
pub mod http;
pub mod realizer;

pub use client::ProviderClient;
pub use error::{ProviderError, RequestError};
pub use realizer::HttpRealizer;
