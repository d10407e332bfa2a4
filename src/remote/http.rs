//! HTTP client abstraction for talking to the books backend.
//!
//! The `HttpClient` trait keeps the pipeline testable without a live server.
//! Implementations only fail for transport problems; status codes and bodies
//! are returned as-is and classified by [`super::ApiClient`].

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::error::RemoteError;

/// A request against the backend, relative to its base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
  pub method: Method,
  /// Absolute path, e.g. `/api/cbsbooks/invoices`
  pub path: String,
  pub body: Option<Value>,
}

impl ApiRequest {
  pub fn get(path: impl Into<String>) -> Self {
    Self {
      method: Method::GET,
      path: path.into(),
      body: None,
    }
  }

  pub fn post(path: impl Into<String>, body: Value) -> Self {
    Self {
      method: Method::POST,
      path: path.into(),
      body: Some(body),
    }
  }

  pub fn put(path: impl Into<String>, body: Value) -> Self {
    Self {
      method: Method::PUT,
      path: path.into(),
      body: Some(body),
    }
  }

  pub fn delete(path: impl Into<String>) -> Self {
    Self {
      method: Method::DELETE,
      path: path.into(),
      body: None,
    }
  }
}

/// Buffered response from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: String,
}

impl HttpResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Whether the declared content type is JSON (including `+json` suffixes).
  pub fn is_json(&self) -> bool {
    self
      .content_type
      .as_deref()
      .map(|ct| ct.to_ascii_lowercase().contains("json"))
      .unwrap_or(false)
  }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
  /// Execute a request.
  ///
  /// # Errors
  /// Returns [`RemoteError::Transport`] when no response was received.
  async fn execute(&self, request: &ApiRequest) -> Result<HttpResponse, RemoteError>;
}

/// Production HTTP client using reqwest.
#[derive(Clone)]
pub struct ReqwestHttpClient {
  client: reqwest::Client,
  base_url: Url,
  token: Option<String>,
}

impl ReqwestHttpClient {
  pub fn new(base_url: Url, timeout: Duration, token: Option<String>) -> Result<Self, RemoteError> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self {
      client,
      base_url: with_trailing_slash(base_url),
      token,
    })
  }
}

/// `Url::join` replaces the last path segment unless the base ends in `/`.
fn with_trailing_slash(mut url: Url) -> Url {
  if !url.path().ends_with('/') {
    let path = format!("{}/", url.path());
    url.set_path(&path);
  }
  url
}

/// Resolve a request path below `base`, keeping any path prefix it carries.
fn endpoint_url(base: &Url, path: &str) -> Result<Url, RemoteError> {
  base
    .join(path.trim_start_matches('/'))
    .map_err(|e| RemoteError::Transport(format!("invalid url for {}: {}", path, e)))
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
  #[tracing::instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
  async fn execute(&self, request: &ApiRequest) -> Result<HttpResponse, RemoteError> {
    let url = endpoint_url(&self.base_url, &request.path)?;

    let mut req = self.client.request(request.method.clone(), url);

    if let Some(token) = &self.token {
      req = req.bearer_auth(token);
    }
    if let Some(body) = &request.body {
      req = req
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body.to_string());
    }

    let response = req.send().await.map_err(|e| {
      tracing::debug!(error = %e, "HTTP request failed");
      RemoteError::from(e)
    })?;

    let status = response.status().as_u16();
    let content_type = response
      .headers()
      .get(reqwest::header::CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(String::from);
    let body = response.text().await?;

    tracing::debug!(status, response_len = body.len(), "HTTP request completed");

    Ok(HttpResponse {
      status,
      content_type,
      body,
    })
  }
}
