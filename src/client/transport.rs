//! Network boundary: the `Transport` trait and its reqwest implementation.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::error::FetchError;

/// A fully resolved outbound request.
#[derive(Debug, Clone)]
pub struct Request {
  pub url: Url,
  pub method: Method,
  pub headers: Vec<(String, String)>,
  pub body: Option<Value>,
  pub timeout: Duration,
}

/// Raw response as seen by the coordinator.
#[derive(Debug, Clone)]
pub struct Response {
  pub status: u16,
  pub status_text: String,
  pub body: Vec<u8>,
}

impl Response {
  /// True for 2xx statuses
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Parse the body as JSON.
  pub fn json(&self) -> Result<Value, FetchError> {
    serde_json::from_slice(&self.body).map_err(|e| FetchError::Decode(e.to_string()))
  }
}

/// Something that can perform a request.
///
/// Implementations report transport-level failures only; status handling and
/// the timeout are layered on by the coordinator.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// HTTP transport backed by reqwest.
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
}

impl HttpTransport {
  pub fn new() -> Result<Self, FetchError> {
    let client = reqwest::Client::builder()
      .gzip(true)
      .deflate(true)
      .build()
      .map_err(|e| FetchError::Transport(format!("Failed to create HTTP client: {}", e)))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone())
      .timeout(request.timeout);

    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }

    if let Some(body) = &request.body {
      let bytes = serde_json::to_vec(body)
        .map_err(|e| FetchError::Transport(format!("Failed to encode body: {}", e)))?;
      builder = builder.header(CONTENT_TYPE, "application/json").body(bytes);
    }

    let response = builder.send().await.map_err(|e| {
      if e.is_timeout() {
        FetchError::Timeout(request.timeout)
      } else {
        FetchError::Transport(e.to_string())
      }
    })?;

    let status = response.status();
    let body = response
      .bytes()
      .await
      .map_err(|e| FetchError::Transport(format!("Failed to read body: {}", e)))?;

    Ok(Response {
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      body: body.to_vec(),
    })
  }
}
