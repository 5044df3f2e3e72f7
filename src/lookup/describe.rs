//! Describe adapters
//!
//! Maps describe lookups onto provider REST calls. Identifiers and filters
//! are sent as EC2-style query parameters:
//!
//! ```text
//! GET <endpoint>/describe-network-interfaces
//!     ?NetworkInterfaceId.1=eni-0123
//!     &Filter.1.Name=interface-type&Filter.1.Value.1=vpc_endpoint
//! ```

use super::adapter::{AdapterRegistry, LookupAdapter};
use super::spec::{LookupRequest, LookupSpec};
use crate::provider::{ProviderClient, ProviderError};
use crate::resolve::path::FieldPath;
use crate::resolve::value::Binding;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub const DESCRIBE_VPC_ENDPOINTS: &str = "describe-vpc-endpoints";
pub const DESCRIBE_NETWORK_INTERFACES: &str = "describe-network-interfaces";

/// Identifier parameter used when a kind has no dedicated name
pub const DEFAULT_ID_PARAM: &str = "Id";

pub const VPCE_NETWORK_INTERFACE: &str = "VpcEndpoints.*.NetworkInterfaceIds.*";
pub const VPCE_DNS_NAME: &str = "VpcEndpoints.*.DnsEntries.0.DnsName";
pub const VPCE_HOSTED_ZONE: &str = "VpcEndpoints.*.DnsEntries.0.HostedZoneId";
pub const ENI_PRIVATE_IP: &str = "NetworkInterfaces.*.PrivateIpAddress";

/// Adapter for one `describe-*` kind backed by the provider API
pub struct DescribeAdapter {
    kind: String,
    id_param: String,
    client: ProviderClient,
}

impl DescribeAdapter {
    pub fn new(kind: impl Into<String>, id_param: impl Into<String>, client: ProviderClient) -> Self {
        Self {
            kind: kind.into(),
            id_param: id_param.into(),
            client,
        }
    }

    pub fn vpc_endpoints(client: ProviderClient) -> Self {
        Self::new(DESCRIBE_VPC_ENDPOINTS, "VpcEndpointId", client)
    }

    pub fn network_interfaces(client: ProviderClient) -> Self {
        Self::new(DESCRIBE_NETWORK_INTERFACES, "NetworkInterfaceId", client)
    }

    fn query_params(&self, request: &LookupRequest) -> Vec<(String, String)> {
        let mut params = Vec::new();

        for (i, id) in request.key.identifiers.iter().enumerate() {
            params.push((format!("{}.{}", self.id_param, i + 1), id.clone()));
        }

        for (i, (name, values)) in request.key.filters.iter().enumerate() {
            params.push((format!("Filter.{}.Name", i + 1), name.clone()));
            for (j, value) in values.iter().enumerate() {
                params.push((format!("Filter.{}.Value.{}", i + 1, j + 1), value.clone()));
            }
        }

        params
    }
}

#[async_trait]
impl LookupAdapter for DescribeAdapter {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn execute(&self, request: &LookupRequest) -> Result<Value, ProviderError> {
        tracing::debug!("describe: kind={}, key={}", self.kind, request.key);

        if request.key.identifiers.iter().any(|id| id.trim().is_empty()) {
            return Err(ProviderError::Permanent(format!(
                "empty identifier in {}",
                request.key
            )));
        }

        let params = self.query_params(request);
        let response = self.client.get(&self.kind, &params).await?;

        if response.is_null() {
            return Err(ProviderError::Permanent(format!(
                "empty response for {}",
                request.key
            )));
        }

        Ok(response)
    }
}

/// Register the built-in describe adapters
pub fn register_builtin(registry: &mut AdapterRegistry, client: &ProviderClient) {
    registry
        .register(DescribeAdapter::vpc_endpoints(client.clone()))
        .register(DescribeAdapter::network_interfaces(client.clone()));
}

fn fields(paths: &[&str]) -> Vec<FieldPath> {
    paths
        .iter()
        .filter_map(|p| FieldPath::parse(p).ok())
        .collect()
}

/// Describe one VPC endpoint: its network interface, DNS name and hosted zone
pub fn describe_vpc_endpoint(vpce_id: impl Into<Binding>) -> Arc<LookupSpec> {
    fields(&[VPCE_NETWORK_INTERFACE, VPCE_DNS_NAME, VPCE_HOSTED_ZONE])
        .into_iter()
        .fold(
            LookupSpec::new(DESCRIBE_VPC_ENDPOINTS).with_identifier(vpce_id),
            LookupSpec::with_field,
        )
        .shared()
}

/// Describe the interface of a VPC endpoint to learn its private IP
pub fn describe_network_interface(eni_id: impl Into<Binding>) -> Arc<LookupSpec> {
    fields(&[ENI_PRIVATE_IP])
        .into_iter()
        .fold(
            LookupSpec::new(DESCRIBE_NETWORK_INTERFACES)
                .with_identifier(eni_id)
                .with_filter("interface-type", vec!["vpc_endpoint".to_string()]),
            LookupSpec::with_field,
        )
        .shared()
}
