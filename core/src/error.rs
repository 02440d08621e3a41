// core/src/error.rs
use anyhow::Error as AnyhowError;
use thiserror::Error;

/// Every failure the settlement core can surface to a caller.
///
/// Variants split into "do not retry" (`Validation`, `Authorization`,
/// `InvalidState`, `NotFound`) and "re-read and retry if still applicable"
/// (`Conflict`, `Storage`, most `Upstream` cases). See [`SettleError::is_retryable`].
#[derive(Debug, Error)]
pub enum SettleError {
  #[error("Validation failed: {0}")]
  Validation(String),

  #[error("Not authorized: {0}")]
  Authorization(String),

  #[error("Invalid state for '{operation}': order {order_id} is {current}")]
  InvalidState {
    order_id: String,
    operation: &'static str,
    current: String,
  },

  #[error("Payment provider call failed (status {status:?}): {body}")]
  Upstream { status: Option<u16>, body: String },

  #[error("Concurrent modification lost a compare-and-set: {0}")]
  Conflict(String),

  #[error("Not found: {0}")]
  NotFound(String),

  #[error("Storage backend error. Source: {source}")]
  Storage {
    #[source]
    source: AnyhowError,
  },
}

impl SettleError {
  pub fn validation(message: impl Into<String>) -> Self {
    SettleError::Validation(message.into())
  }

  pub fn authorization(message: impl Into<String>) -> Self {
    SettleError::Authorization(message.into())
  }

  pub fn conflict(message: impl Into<String>) -> Self {
    SettleError::Conflict(message.into())
  }

  pub fn not_found(message: impl Into<String>) -> Self {
    SettleError::NotFound(message.into())
  }

  pub fn invalid_state(order_id: impl Into<String>, operation: &'static str, current: impl std::fmt::Display) -> Self {
    SettleError::InvalidState {
      order_id: order_id.into(),
      operation,
      current: current.to_string(),
    }
  }

  /// Whether the caller may safely re-read state and try the same call again.
  pub fn is_retryable(&self) -> bool {
    match self {
      SettleError::Conflict(_) | SettleError::Storage { .. } => true,
      // No status means the request never got an answer (timeout, connect error).
      SettleError::Upstream { status, .. } => match status {
        None => true,
        Some(code) => *code == 429 || *code >= 500,
      },
      SettleError::Validation(_)
      | SettleError::Authorization(_)
      | SettleError::InvalidState { .. }
      | SettleError::NotFound(_) => false,
    }
  }
}

// Store backends report their own error types through anyhow.
impl From<AnyhowError> for SettleError {
  fn from(err: AnyhowError) -> Self {
    SettleError::Storage { source: err }
  }
}

impl From<reqwest::Error> for SettleError {
  fn from(err: reqwest::Error) -> Self {
    SettleError::Upstream {
      status: err.status().map(|s| s.as_u16()),
      body: err.to_string(),
    }
  }
}

pub type SettleResult<T, E = SettleError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn retry_classification() {
    assert!(SettleError::conflict("lost").is_retryable());
    assert!(SettleError::Upstream { status: Some(503), body: String::new() }.is_retryable());
    assert!(SettleError::Upstream { status: None, body: "timeout".into() }.is_retryable());
    assert!(!SettleError::Upstream { status: Some(422), body: String::new() }.is_retryable());
    assert!(!SettleError::validation("negative amount").is_retryable());
    assert!(!SettleError::invalid_state("o-1", "verify", "CANCELLED").is_retryable());
  }
}
