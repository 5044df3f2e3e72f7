//! HTTP utilities for provider REST API calls

use super::error::RequestError;
use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// HTTP client wrapper for provider API calls
#[derive(Clone)]
pub struct ProviderHttpClient {
    client: Client,
}

impl ProviderHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("stackwire/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Make a GET request
    pub async fn get(
        &self,
        url: &str,
        token: Option<&str>,
        query: &[(String, String)],
    ) -> Result<Value, RequestError> {
        tracing::debug!("GET {} ({} query params)", url, query.len());

        let request = with_auth(self.client.get(url).query(query), token);
        send(request).await
    }

    /// Make a POST request with a JSON body
    pub async fn post(
        &self,
        url: &str,
        token: Option<&str>,
        body: &Value,
    ) -> Result<Value, RequestError> {
        tracing::debug!("POST {}", url);

        let request = with_auth(self.client.post(url).json(body), token);
        send(request).await
    }
}

fn with_auth(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

async fn send(request: RequestBuilder) -> Result<Value, RequestError> {
    let response = request.send().await.map_err(RequestError::Send)?;

    let status = response.status();
    let body = response.text().await.map_err(RequestError::Send)?;

    if !status.is_success() {
        // Only log sanitized/truncated error body
        tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
        return Err(RequestError::Status { status });
    }

    // Handle empty response
    if body.is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&body).map_err(RequestError::Decode)
}
