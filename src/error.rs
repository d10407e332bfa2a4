//! Error types for the sync layer.
//!
//! Remote and store failures are absorbed inside the pipeline; they only show
//! up here so they can be logged, tested, and reported in batch summaries.

use thiserror::Error;

/// Failure talking to the remote backend.
#[derive(Error, Debug)]
pub enum RemoteError {
  /// The request never produced a response (DNS, connect, timeout).
  #[error("transport failure: {0}")]
  Transport(String),

  /// The backend answered with a non-success status.
  #[error("remote returned status {status}")]
  Status { status: u16, body: String },

  /// Success status, but the body is not JSON (typically an HTML error page).
  #[error("remote returned non-JSON content (status {status}, content-type {content_type:?})")]
  NotJson {
    status: u16,
    content_type: Option<String>,
  },

  /// Body claimed to be JSON but failed to decode.
  #[error("failed to decode remote response: {0}")]
  Parse(#[from] serde_json::Error),
}

/// Coarse classification of a [`RemoteError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
  Transport,
  Protocol,
  Parse,
}

impl RemoteError {
  pub fn kind(&self) -> FailureKind {
    match self {
      Self::Transport(_) => FailureKind::Transport,
      Self::Status { .. } | Self::NotJson { .. } => FailureKind::Protocol,
      Self::Parse(_) => FailureKind::Parse,
    }
  }
}

impl From<reqwest::Error> for RemoteError {
  fn from(err: reqwest::Error) -> Self {
    Self::Transport(err.to_string())
  }
}

/// Failure in one of the local persistent stores.
#[derive(Error, Debug)]
pub enum StoreError {
  /// Writing the payload would push the tier past its byte quota.
  #[error("quota exceeded writing '{key}': {needed} bytes needed, limit {limit}")]
  QuotaExceeded {
    key: String,
    needed: u64,
    limit: u64,
  },

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// The store could not be used in this context (failed to open, lock poisoned).
  #[error("store unavailable: {0}")]
  Unavailable(String),
}

/// Errors that reach callers of the pipeline.
#[derive(Error, Debug)]
pub enum BooksError {
  /// Neither the remote backend nor the local database could produce the collection.
  #[error("could not read {collection}: {reason}")]
  Unreadable {
    collection: &'static str,
    reason: String,
  },
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_remote_error_kinds() {
    assert_eq!(
      RemoteError::Transport("refused".into()).kind(),
      FailureKind::Transport
    );
    assert_eq!(
      RemoteError::Status {
        status: 502,
        body: String::new()
      }
      .kind(),
      FailureKind::Protocol
    );
    assert_eq!(
      RemoteError::NotJson {
        status: 200,
        content_type: Some("text/html".into())
      }
      .kind(),
      FailureKind::Protocol
    );

    let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    assert_eq!(RemoteError::from(parse).kind(), FailureKind::Parse);
  }

  #[test]
  fn test_quota_message_names_key() {
    let err = StoreError::QuotaExceeded {
      key: "invoices".into(),
      needed: 10,
      limit: 5,
    };
    assert!(err.to_string().contains("invoices"));
  }
}
