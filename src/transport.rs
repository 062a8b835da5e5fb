//! # Transport
//!
//! The raw I/O seam of the resolver. Every outbound call (explorer page GET, subgraph
//! GraphQL POST, JSON-RPC POST) goes through a [`Transport`], and every transport call is
//! issued by the [`crate::fetcher::ResilientFetcher`], which owns retry, memoization and
//! rate limiting. Tests substitute a counting in-memory implementation.

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, USER_AGENT};
use serde_json::Value;
use std::time::Duration;

use crate::errors::{ResolverError, Result};

/// Browser-like user agent; explorers block obvious scripted clients.
const EXPLORER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36";

/// A single failed attempt. All variants are treated as transient by the fetcher.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("GraphQL errors: {0}")]
    GraphQl(String),
    #[error("Empty response from {0}")]
    Empty(String),
    #[error("Malformed payload from {url}: {message}")]
    Malformed { url: String, message: String },
}

/// Raw outbound calls used by the resolver.
#[async_trait]
pub trait Transport: Send + Sync {
    /// HTTP GET returning the body as text (explorer pages).
    async fn get_text(&self, url: &str) -> std::result::Result<String, TransportError>;

    /// HTTP POST of a JSON body returning the decoded JSON response (GraphQL, JSON-RPC).
    async fn post_json(&self, url: &str, body: &Value) -> std::result::Result<Value, TransportError>;
}

/// `reqwest`-backed transport.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(EXPLORER_USER_AGENT));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,application/json;q=0.8,*/*;q=0.7"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ResolverError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

fn request_error(url: &str, e: reqwest::Error) -> TransportError {
    TransportError::Request {
        url: url.to_string(),
        message: e.to_string(),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_text(&self, url: &str) -> std::result::Result<String, TransportError> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await.map_err(|e| request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| request_error(url, e))?;
        if body.trim().is_empty() {
            return Err(TransportError::Empty(url.to_string()));
        }
        Ok(body)
    }

    async fn post_json(&self, url: &str, body: &Value) -> std::result::Result<Value, TransportError> {
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let text = response.text().await.map_err(|e| request_error(url, e))?;
        if text.trim().is_empty() {
            return Err(TransportError::Empty(url.to_string()));
        }
        serde_json::from_str(&text).map_err(|e| TransportError::Malformed {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}
