// core/src/gateway/mod.rs

//! Payment provider integration.
//!
//! [`PaymentGateway`] is the seam the order flow talks to; [`paypal::PayPalGateway`]
//! is the REST implementation. [`notification::NotificationProcessor`] turns an
//! inbound provider webhook into a `confirm_gateway_payment` call.

pub mod notification;
pub mod paypal;
pub mod signature;

use crate::error::SettleResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use notification::{NotificationOutcome, NotificationProcessor};
pub use paypal::{PayPalConfig, PayPalGateway};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRequest {
  /// Minor units.
  pub amount: i64,
  pub currency: String,
  /// Internal order id, sent to the provider as the correlation id.
  pub order_id: String,
  pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
  pub provider_order_id: String,
  pub status: String,
  pub approve_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResult {
  pub provider_order_id: String,
  pub capture_id: Option<String>,
  pub status: String,
}

impl CaptureResult {
  pub fn is_completed(&self) -> bool {
    self.status.eq_ignore_ascii_case("COMPLETED")
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResult {
  pub refund_id: String,
  pub status: String,
}

/// Signature-related headers of a provider notification. Header names are
/// matched case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationHeaders {
  pub auth_algo: Option<String>,
  pub cert_url: Option<String>,
  pub transmission_id: Option<String>,
  pub transmission_sig: Option<String>,
  pub transmission_time: Option<String>,
}

impl NotificationHeaders {
  pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
    let mut headers = NotificationHeaders::default();
    for (name, value) in pairs {
      let slot = match name.to_ascii_lowercase().as_str() {
        "paypal-auth-algo" => &mut headers.auth_algo,
        "paypal-cert-url" => &mut headers.cert_url,
        "paypal-transmission-id" => &mut headers.transmission_id,
        "paypal-transmission-sig" => &mut headers.transmission_sig,
        "paypal-transmission-time" => &mut headers.transmission_time,
        _ => continue,
      };
      *slot = Some(value.to_string());
    }
    headers
  }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
  /// Creates the provider-side payment object. Not retried: there is no
  /// client idempotency key, so a retry after a lost response could create a
  /// second provider order.
  async fn create_intent(&self, request: &IntentRequest) -> SettleResult<PaymentIntent>;

  async fn capture(&self, provider_order_id: &str) -> SettleResult<CaptureResult>;

  async fn refund(&self, capture_id: &str) -> SettleResult<RefundResult>;

  /// Checks the provider signature over the raw body.
  fn verify_notification(&self, headers: &NotificationHeaders, raw_body: &[u8]) -> bool;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn headers_are_picked_case_insensitively() {
    let headers = NotificationHeaders::from_pairs([
      ("PAYPAL-AUTH-ALGO", "HMACSHA256"),
      ("paypal-transmission-id", "tx-1"),
      ("Content-Type", "application/json"),
    ]);
    assert_eq!(headers.auth_algo.as_deref(), Some("HMACSHA256"));
    assert_eq!(headers.transmission_id.as_deref(), Some("tx-1"));
    assert!(headers.transmission_sig.is_none());
  }
}
