use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::http::{ApiRequest, HttpClient, HttpResponse, ReqwestHttpClient};
use crate::config::Config;
use crate::error::RemoteError;
use crate::model::{Collection, Entity};

const API_PREFIX: &str = "/api/cbsbooks";

/// Typed client for the books REST endpoints.
#[derive(Clone)]
pub struct ApiClient {
  http: Arc<dyn HttpClient>,
}

impl ApiClient {
  pub fn new(http: Arc<dyn HttpClient>) -> Self {
    Self { http }
  }

  /// Build a reqwest-backed client from configuration.
  pub fn from_config(config: &Config) -> Result<Self> {
    let base_url = url::Url::parse(&config.api.url)
      .map_err(|e| eyre!("Invalid api.url '{}': {}", config.api.url, e))?;
    let http = ReqwestHttpClient::new(base_url, config.timeout(), Config::api_token())
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;
    Ok(Self::new(Arc::new(http)))
  }

  fn collection_path(collection: Collection) -> String {
    format!("{}/{}", API_PREFIX, collection.as_str())
  }

  /// The id is percent-encoded so `#`, `?` and `/` stay inside the segment.
  fn record_path(collection: Collection, id: &str) -> String {
    format!(
      "{}/{}/{}",
      API_PREFIX,
      collection.as_str(),
      urlencoding::encode(id)
    )
  }

  async fn send(&self, request: ApiRequest) -> Result<HttpResponse, RemoteError> {
    self.http.execute(&request).await
  }

  /// Fetch a whole collection.
  pub async fn list<T: Entity>(&self) -> Result<Vec<T>, RemoteError> {
    let response = self
      .send(ApiRequest::get(Self::collection_path(T::COLLECTION)))
      .await?;
    decode_json(response)
  }

  /// Create a record; returns the server's copy.
  pub async fn create<T: Entity>(&self, record: &T) -> Result<T, RemoteError> {
    let body = serde_json::to_value(record)?;
    let response = self
      .send(ApiRequest::post(Self::collection_path(T::COLLECTION), body))
      .await?;
    decode_json(response)
  }

  /// Replace a record; returns the server's copy.
  pub async fn update<T: Entity>(&self, record: &T) -> Result<T, RemoteError> {
    let body = serde_json::to_value(record)?;
    let response = self
      .send(ApiRequest::put(
        Self::record_path(T::COLLECTION, record.id()),
        body,
      ))
      .await?;
    decode_json(response)
  }

  /// Delete a record. Any 2xx status counts, with or without a body.
  pub async fn delete(&self, collection: Collection, id: &str) -> Result<(), RemoteError> {
    let response = self
      .send(ApiRequest::delete(Self::record_path(collection, id)))
      .await?;
    if response.is_success() {
      Ok(())
    } else {
      Err(RemoteError::Status {
        status: response.status,
        body: response.body,
      })
    }
  }

  /// Upload locally held collections to the migration endpoint.
  pub async fn migrate<P: Serialize + ?Sized>(&self, payload: &P) -> Result<Value, RemoteError> {
    let body = serde_json::to_value(payload)?;
    let path = format!("{}/migrate-localstorage", API_PREFIX);
    decode_json(self.send(ApiRequest::post(path, body)).await?)
  }

  /// Forward an opaque JSON body to a supplementary endpoint.
  pub async fn forward(&self, endpoint: &str, body: &Value) -> Result<Value, RemoteError> {
    let path = format!("{}/{}", API_PREFIX, endpoint.trim_start_matches('/'));
    decode_json(self.send(ApiRequest::post(path, body.clone())).await?)
  }

  pub async fn create_payment_link(&self, body: &Value) -> Result<Value, RemoteError> {
    self.forward("create-payment-link", body).await
  }

  pub async fn send_email(&self, body: &Value) -> Result<Value, RemoteError> {
    self.forward("send-email", body).await
  }

  /// Lightweight read used to decide whether the backend can serve JSON.
  ///
  /// Never fails: any transport, status, content-type or parse problem reads
  /// as unavailable.
  pub async fn probe(&self, collection: Collection) -> bool {
    let result = self
      .send(ApiRequest::get(Self::collection_path(collection)))
      .await
      .and_then(decode_json::<Value>);
    match result {
      Ok(_) => true,
      Err(e) => {
        tracing::info!(error = %e, "Remote backend unavailable");
        false
      }
    }
  }
}

/// Classify a response: success status, JSON content type, and a decodable body.
fn decode_json<T: DeserializeOwned>(response: HttpResponse) -> Result<T, RemoteError> {
  if !response.is_success() {
    return Err(RemoteError::Status {
      status: response.status,
      body: response.body,
    });
  }
  if !response.is_json() {
    return Err(RemoteError::NotJson {
      status: response.status,
      content_type: response.content_type,
    });
  }
  Ok(serde_json::from_str(&response.body)?)
}
