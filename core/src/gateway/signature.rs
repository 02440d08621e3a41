// core/src/gateway/signature.rs

//! Shared-secret webhook signatures (HMAC-SHA256).
//!
//! Signed message: `{transmission_id}|{transmission_time}|{webhook_id}|{sha256_hex(body)}`,
//! signature header is the base64 of the MAC.

use super::NotificationHeaders;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

pub const SIGNATURE_ALGORITHM: &str = "HMACSHA256";

/// Notifications older (or further in the future) than this are rejected as replays.
pub const MAX_CLOCK_SKEW_SECS: i64 = 300;

fn signed_message(transmission_id: &str, transmission_time: &str, webhook_id: &str, body: &[u8]) -> String {
  let body_hash = hex::encode(Sha256::digest(body));
  format!("{transmission_id}|{transmission_time}|{webhook_id}|{body_hash}")
}

/// Produces the value of the `paypal-transmission-sig` header.
pub fn sign_notification(
  secret: &str,
  webhook_id: &str,
  transmission_id: &str,
  transmission_time: &str,
  body: &[u8],
) -> Result<String, &'static str> {
  let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| "HMAC key error")?;
  mac.update(signed_message(transmission_id, transmission_time, webhook_id, body).as_bytes());
  Ok(BASE64.encode(mac.finalize().into_bytes()))
}

pub fn verify_notification_signature(
  secret: &str,
  webhook_id: &str,
  headers: &NotificationHeaders,
  body: &[u8],
  now: DateTime<Utc>,
) -> Result<(), &'static str> {
  let algo = headers.auth_algo.as_deref().ok_or("Missing auth algorithm header")?;
  if !algo.eq_ignore_ascii_case(SIGNATURE_ALGORITHM) {
    return Err("Unsupported signature algorithm");
  }
  let transmission_id = headers.transmission_id.as_deref().ok_or("Missing transmission id")?;
  let transmission_time = headers.transmission_time.as_deref().ok_or("Missing transmission time")?;
  let signature = headers.transmission_sig.as_deref().ok_or("Missing transmission signature")?;

  let sent_at = DateTime::parse_from_rfc3339(transmission_time).map_err(|_| "Invalid transmission time")?;
  if (now - sent_at.with_timezone(&Utc)).num_seconds().abs() > MAX_CLOCK_SKEW_SECS {
    return Err("Notification timestamp outside the accepted window");
  }

  let sig_bytes = BASE64.decode(signature).map_err(|_| "Invalid signature encoding")?;
  let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| "HMAC key error")?;
  mac.update(signed_message(transmission_id, transmission_time, webhook_id, body).as_bytes());
  // verify_slice compares in constant time
  mac.verify_slice(&sig_bytes).map_err(|_| "Webhook signature mismatch")
}

#[cfg(test)]
mod tests {
  use super::*;

  fn signed_headers(secret: &str, body: &[u8], time: &str) -> NotificationHeaders {
    NotificationHeaders {
      auth_algo: Some(SIGNATURE_ALGORITHM.to_string()),
      cert_url: None,
      transmission_id: Some("tx-1".to_string()),
      transmission_sig: Some(sign_notification(secret, "wh-1", "tx-1", time, body).unwrap()),
      transmission_time: Some(time.to_string()),
    }
  }

  #[test]
  fn accepts_a_fresh_valid_signature() {
    let now = Utc::now();
    let body = br#"{"event_type":"PAYMENT.CAPTURE.COMPLETED"}"#;
    let headers = signed_headers("s3cret", body, &now.to_rfc3339());
    assert_eq!(verify_notification_signature("s3cret", "wh-1", &headers, body, now), Ok(()));
  }

  #[test]
  fn rejects_tampered_body_and_wrong_secret() {
    let now = Utc::now();
    let body = br#"{"amount":"100.00"}"#;
    let headers = signed_headers("s3cret", body, &now.to_rfc3339());
    assert!(verify_notification_signature("s3cret", "wh-1", &headers, br#"{"amount":"999.00"}"#, now).is_err());
    assert!(verify_notification_signature("other", "wh-1", &headers, body, now).is_err());
    assert!(verify_notification_signature("s3cret", "wh-2", &headers, body, now).is_err());
  }

  #[test]
  fn rejects_stale_transmissions_and_unknown_algorithms() {
    let now = Utc::now();
    let body = b"{}";
    let old = (now - chrono::Duration::seconds(MAX_CLOCK_SKEW_SECS + 60)).to_rfc3339();
    let headers = signed_headers("s3cret", body, &old);
    assert!(verify_notification_signature("s3cret", "wh-1", &headers, body, now).is_err());

    let mut headers = signed_headers("s3cret", body, &now.to_rfc3339());
    headers.auth_algo = Some("SHA256withRSA".to_string());
    assert_eq!(
      verify_notification_signature("s3cret", "wh-1", &headers, body, now),
      Err("Unsupported signature algorithm")
    );
  }
}
