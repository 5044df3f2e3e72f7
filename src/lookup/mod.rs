//! External lookup layer
//!
//! Lookups are the reads whose responses feed deferred values.
//!
//! # Architecture
//!
//! - [`spec`] - Declared lookups and the cache key derived once identifiers resolve
//! - [`adapter`] - The adapter contract and the per-engine registry
//! - [`describe`] - Provider-backed describe adapters and ready-made lookups
//!
//! # Example
//!
//! ```ignore
//! use stackwire::lookup::describe::{describe_network_interface, describe_vpc_endpoint};
//! use stackwire::lookup::response_field;
//!
//! let vpce = describe_vpc_endpoint("vpce-0abc");
//! let eni = response_field(&vpce, "VpcEndpoints.*.NetworkInterfaceIds.*")?;
//! let ip = response_field(&describe_network_interface(eni), "NetworkInterfaces.*.PrivateIpAddress")?;
//! ```

pub mod adapter;
pub mod describe;
pub mod spec;

pub use adapter::{AdapterRegistry, LookupAdapter};
pub use spec::{response_field, LookupKey, LookupRequest, LookupSpec};
