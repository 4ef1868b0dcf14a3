//! Error types for the storage and network boundaries.

use std::time::Duration;
use thiserror::Error;

/// Failures of the durable key-value medium.
///
/// These never reach callers of the persistent cache: it logs them and
/// degrades to "no cache". They stay typed so tests can observe them.
#[derive(Debug, Error)]
pub enum StorageError {
  /// The medium could not be reached or refused the operation (full, locked, gone)
  #[error("storage unavailable: {0}")]
  Unavailable(String),
  /// A value could not be serialized for writing
  #[error("failed to serialize value: {0}")]
  Serialize(String),
  /// A stored value exists but cannot be interpreted
  #[error("corrupt entry '{key}': {reason}")]
  Corrupt { key: String, reason: String },
}

impl From<rusqlite::Error> for StorageError {
  fn from(e: rusqlite::Error) -> Self {
    StorageError::Unavailable(e.to_string())
  }
}

/// Failures of a network load.
///
/// `Clone` because a single outcome is handed to every caller that joined the
/// same in-flight request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
  #[error("invalid resource '{resource}': {reason}")]
  InvalidUrl { resource: String, reason: String },
  /// Non-2xx response
  #[error("HTTP {status}: {status_text}")]
  Status { status: u16, status_text: String },
  #[error("request timed out after {0:?}")]
  Timeout(Duration),
  #[error("transport error: {0}")]
  Transport(String),
  /// Response body did not match the expected shape
  #[error("failed to decode response: {0}")]
  Decode(String),
}

impl FetchError {
  /// HTTP status of the failed response, if the server answered at all.
  pub fn status(&self) -> Option<u16> {
    match self {
      FetchError::Status { status, .. } => Some(*status),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_error_message_carries_code_and_text() {
    let err = FetchError::Status {
      status: 503,
      status_text: "Service Unavailable".to_string(),
    };
    assert_eq!(err.to_string(), "HTTP 503: Service Unavailable");
    assert_eq!(err.status(), Some(503));
  }

  #[test]
  fn test_timeout_has_no_status() {
    assert_eq!(FetchError::Timeout(Duration::from_secs(10)).status(), None);
  }
}
