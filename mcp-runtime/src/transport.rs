use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use thiserror::Error;

use crate::util::client;

/// One call against the DevRev API, relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl RemoteRequest {
    pub fn post(path: &str, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.to_string(),
            body: Some(body),
        }
    }

    pub fn get(path: &str) -> Self {
        Self {
            method: Method::GET,
            path: path.to_string(),
            body: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: Value,
}

impl RemoteResponse {
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }
}

/// No usable response was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("DevRev API key is not configured")]
    MissingCredential,

    #[error("Request to {path} timed out")]
    Timeout { path: String },

    #[error("Failed to reach DevRev API for {path}: {message}")]
    Unreachable { path: String, message: String },

    #[error("Failed to read DevRev API response for {path}: {message}")]
    Body { path: String, message: String },
}

/// Submit a request, get a response. Authentication, connection handling
/// and timeouts live behind this seam.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn submit(&self, request: RemoteRequest) -> Result<RemoteResponse, TransportError>;
}

#[derive(Clone, Debug)]
pub struct TransportConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

pub struct HttpTransport {
    config: TransportConfig,
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            http: client(),
        }
    }

    fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn submit(&self, request: RemoteRequest) -> Result<RemoteResponse, TransportError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(TransportError::MissingCredential)?;

        let mut builder = self
            .http
            .request(request.method.clone(), self.url_for(&request.path))
            .bearer_auth(api_key)
            .timeout(self.config.timeout);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!(method = %request.method, path = %request.path, "calling DevRev API");
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout {
                    path: request.path.clone(),
                }
            } else {
                TransportError::Unreachable {
                    path: request.path.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| TransportError::Body {
            path: request.path.clone(),
            message: e.to_string(),
        })?;
        tracing::debug!(path = %request.path, status, "DevRev API responded");

        Ok(RemoteResponse {
            status,
            body: parse_response_body(&bytes),
        })
    }
}

/// Non-JSON bodies are kept as text so error messages can still use them.
pub(crate) fn parse_response_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).to_string()))
}
