//! Provider Client
//!
//! Main client for the provider API, combining the endpoint, credentials
//! and HTTP functionality.

use super::error::RequestError;
use super::http::ProviderHttpClient;
use anyhow::{Context, Result};
use serde_json::Value;
use url::Url;

/// Main provider client
#[derive(Clone)]
pub struct ProviderClient {
    pub http: ProviderHttpClient,
    pub endpoint: Url,
    token: Option<String>,
}

impl ProviderClient {
    /// Create a new provider client
    pub fn new(endpoint: &str, token: Option<String>) -> Result<Self> {
        let mut endpoint = Url::parse(endpoint)
            .with_context(|| format!("Invalid provider endpoint: {}", endpoint))?;
        if endpoint.cannot_be_a_base() {
            anyhow::bail!("Provider endpoint cannot be used as a base URL: {}", endpoint);
        }
        // Url::join replaces the last segment unless the path ends with '/'
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        let http = ProviderHttpClient::new()?;

        Ok(Self {
            http,
            endpoint,
            token,
        })
    }

    /// Make a GET request relative to the endpoint
    pub async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value, RequestError> {
        let url = self.url(path);
        self.http.get(&url, self.token.as_deref(), query).await
    }

    /// Make a POST request relative to the endpoint
    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, RequestError> {
        let url = self.url(path);
        self.http.post(&url, self.token.as_deref(), body).await
    }

    /// Build a URL below the endpoint, percent-encoding each segment
    pub fn url(&self, path: &str) -> String {
        let encoded = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::encode(s).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}{}", self.endpoint, encoded)
    }

    /// Path for realizing a resource of the given type
    pub fn resource_path(resource_type: &str) -> String {
        format!("resources/{}", resource_type)
    }
}
