//! HTTP transport used by every provider.
//!
//! Providers build a JSON body and hand it to a [`Transport`]; the
//! production implementation is a thin wrapper over `reqwest`. Keeping the
//! seam this narrow lets tests record outgoing requests and script replies.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ProviderError;

/// An outgoing JSON POST.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

/// Raw status and body of a backend reply.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(&self, request: HttpRequest) -> Result<HttpReply>;
}

/// `reqwest`-backed transport. Cheap to clone; share one client per process.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post_json(&self, request: HttpRequest) -> Result<HttpReply> {
        let mut builder = self
            .client
            .post(&request.url)
            .header("Content-Type", "application/json");
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .json(&request.body)
            .send()
            .await
            .context("Failed to send request to LLM API")?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .context("Failed to read LLM API response body")?;

        Ok(HttpReply { status, body })
    }
}

// ── Vendor error envelopes ──────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorResponse {
    Single(ErrorBody),
    Multiple(Vec<ErrorBody>),
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl ErrorResponse {
    fn message(&self) -> String {
        match self {
            Self::Single(b) => b.error.message.clone(),
            Self::Multiple(v) => v
                .first()
                .map(|b| b.error.message.clone())
                .unwrap_or_else(|| "Unknown error".into()),
        }
    }
}

/// Send `request` and return the body of a successful reply.
///
/// Every failure is attributed to `provider` as a [`ProviderError::Request`].
pub(crate) async fn dispatch(
    transport: &dyn Transport,
    provider: &str,
    request: HttpRequest,
) -> Result<String, ProviderError> {
    let reply = transport
        .post_json(request)
        .await
        .map_err(|e| ProviderError::request(provider, format!("{e:#}")))?;

    if !reply.is_success() {
        let err_msg = serde_json::from_str::<ErrorResponse>(&reply.body)
            .map(|e| e.message())
            .unwrap_or_else(|_| reply.body.clone());
        return Err(ProviderError::request(
            provider,
            format!("LLM API error ({}): {}", reply.status, err_msg),
        ));
    }

    Ok(reply.body)
}
