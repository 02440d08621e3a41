// apps/marketplace_app/src/errors.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;
use tradeflow::SettleError;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Authentication Failed: {0}")]
  Auth(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Feature Disabled: {0}")]
  Disabled(&'static str),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error(transparent)]
  Settle(#[from] SettleError),

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    match err.downcast::<sqlx::Error>() {
      Ok(sqlx_err) => AppError::Sqlx(sqlx_err),
      Err(other) => AppError::Internal(other.to_string()),
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Auth(_) => StatusCode::UNAUTHORIZED,
      AppError::Disabled(_) => StatusCode::SERVICE_UNAVAILABLE,
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
      AppError::Settle(e) => match e {
        SettleError::Validation(_) => StatusCode::BAD_REQUEST,
        SettleError::Authorization(_) => StatusCode::FORBIDDEN,
        SettleError::InvalidState { .. } | SettleError::Conflict(_) => StatusCode::CONFLICT,
        SettleError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        SettleError::NotFound(_) => StatusCode::NOT_FOUND,
        SettleError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
      },
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %self, "Responding with error");
    } else {
      tracing::warn!(application_error = %self, "Responding with error");
    }
    let body = match self {
      AppError::Sqlx(_) => json!({"error": "Database operation failed", "retryable": true}),
      AppError::Config(m) | AppError::Internal(m) => json!({"error": "An internal error occurred", "detail": m}),
      AppError::Auth(m) => json!({"error": m}),
      AppError::Disabled(what) => json!({"error": format!("{what} is not configured")}),
      AppError::Settle(SettleError::Storage { .. }) => {
        json!({"error": "Storage operation failed", "retryable": true})
      }
      AppError::Settle(SettleError::Upstream { status, .. }) => json!({
        "error": "Payment provider error",
        "upstreamStatus": status,
        "retryable": self.is_retryable(),
      }),
      AppError::Settle(e) => json!({"error": e.to_string(), "retryable": e.is_retryable()}),
    };
    HttpResponse::build(status).json(body)
  }
}

impl AppError {
  fn is_retryable(&self) -> bool {
    match self {
      AppError::Settle(e) => e.is_retryable(),
      AppError::Sqlx(_) => true,
      _ => false,
    }
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn settle_errors_map_to_http_statuses() {
    let cases = [
      (SettleError::validation("bad"), StatusCode::BAD_REQUEST),
      (SettleError::authorization("no"), StatusCode::FORBIDDEN),
      (SettleError::invalid_state("o-1", "complete", "PENDING_PAYMENT"), StatusCode::CONFLICT),
      (SettleError::conflict("lost"), StatusCode::CONFLICT),
      (SettleError::not_found("order o-1"), StatusCode::NOT_FOUND),
      (
        SettleError::Upstream {
          status: Some(503),
          body: String::new(),
        },
        StatusCode::BAD_GATEWAY,
      ),
    ];
    for (err, expected) in cases {
      assert_eq!(AppError::from(err).status_code(), expected);
    }
  }

  #[test]
  fn anyhow_wrapped_sqlx_errors_stay_database_errors() {
    let err = AppError::from(anyhow::Error::from(sqlx::Error::RowNotFound));
    assert!(matches!(err, AppError::Sqlx(_)));
  }
}
