//! Resource realization over the provider API
//!
//! `POST <endpoint>/resources/<type>` with `{"id": ..., "inputs": {...}}`.
//! The response object's scalar members become the node's attributes.

use super::client::ProviderClient;
use super::error::ProviderError;
use crate::resolve::graph::{Attributes, Realize, ResourceNode};
use crate::resolve::value::{Binding, Scalar};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub struct HttpRealizer {
    client: ProviderClient,
}

impl HttpRealizer {
    pub fn new(client: ProviderClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Realize for HttpRealizer {
    async fn realize(
        &self,
        node: &ResourceNode,
        inputs: &BTreeMap<String, Scalar>,
    ) -> Result<Attributes, ProviderError> {
        let body = json!({
            "id": node.id(),
            "inputs": inputs,
        });
        let path = ProviderClient::resource_path(node.resource_type());
        let response = self.client.post(&path, &body).await?;

        let Value::Object(map) = response else {
            return Err(ProviderError::Permanent(format!(
                "realizing {} returned no attribute object",
                node.id()
            )));
        };

        let attributes = map
            .iter()
            .filter_map(|(k, v)| Scalar::from_json(v).map(|s| (k.clone(), Binding::Value(s))))
            .collect();
        Ok(attributes)
    }
}
