// core/src/gateway/paypal.rs

use super::signature::verify_notification_signature;
use super::{CaptureResult, IntentRequest, NotificationHeaders, PaymentGateway, PaymentIntent, RefundResult};
use crate::error::{SettleError, SettleResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Refresh the cached access token this long before the provider says it expires.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Currencies the provider expects without decimals.
const ZERO_DECIMAL_CURRENCIES: &[&str] = &["HUF", "JPY", "TWD"];

#[derive(Debug, Clone)]
pub struct PayPalConfig {
  pub base_url: String,
  pub client_id: String,
  pub client_secret: String,
  pub webhook_id: String,
  /// `None` disables signature checks (lower environments only).
  pub webhook_secret: Option<String>,
  pub request_timeout: Duration,
}

impl PayPalConfig {
  pub fn sandbox(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
    PayPalConfig {
      base_url: "https://api-m.sandbox.paypal.com".to_string(),
      client_id: client_id.into(),
      client_secret: client_secret.into(),
      webhook_id: String::new(),
      webhook_secret: None,
      request_timeout: Duration::from_secs(15),
    }
  }
}

#[derive(Debug, Clone)]
struct CachedToken {
  value: String,
  expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
  access_token: String,
  expires_in: i64,
}

#[derive(Debug)]
pub struct PayPalGateway {
  config: PayPalConfig,
  http: reqwest::Client,
  token: Mutex<Option<CachedToken>>,
}

impl PayPalGateway {
  pub fn new(config: PayPalConfig) -> SettleResult<Self> {
    let http = reqwest::Client::builder().timeout(config.request_timeout).build()?;
    Ok(PayPalGateway {
      config,
      http,
      token: Mutex::new(None),
    })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
  }

  /// Returns a cached token while it is still comfortably valid, otherwise fetches a new one.
  async fn access_token(&self) -> SettleResult<String> {
    let now = Utc::now();
    let cached = self.token.lock().clone();
    if let Some(cached) = cached {
      if cached.expires_at - ChronoDuration::seconds(TOKEN_REFRESH_MARGIN_SECS) > now {
        return Ok(cached.value);
      }
    }

    let resp = self
      .http
      .post(self.url("/v1/oauth2/token"))
      .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
      .form(&[("grant_type", "client_credentials")])
      .send()
      .await?;
    let token: TokenResponse = read_success(resp, "access token").await?;

    let cached = CachedToken {
      value: token.access_token,
      expires_at: now + ChronoDuration::seconds(token.expires_in),
    };
    let value = cached.value.clone();
    *self.token.lock() = Some(cached);
    Ok(value)
  }

  async fn post_json(&self, path: &str, body: &JsonValue, what: &str) -> SettleResult<JsonValue> {
    let token = self.access_token().await?;
    let resp = self.http.post(self.url(path)).bearer_auth(token).json(body).send().await?;
    read_success(resp, what).await
  }
}

/// Deserializes a 2xx body; anything else becomes `Upstream` with the provider's status and body.
async fn read_success<T: serde::de::DeserializeOwned>(resp: reqwest::Response, what: &str) -> SettleResult<T> {
  let status = resp.status();
  if !status.is_success() {
    let body = resp.text().await.unwrap_or_default();
    error!(status = status.as_u16(), %body, "Payment provider rejected {} request.", what);
    return Err(SettleError::Upstream {
      status: Some(status.as_u16()),
      body,
    });
  }
  resp.json::<T>().await.map_err(|e| SettleError::Upstream {
    status: Some(status.as_u16()),
    body: format!("unreadable {what} response: {e}"),
  })
}

/// Minor units to the provider's decimal string ("10050" THB -> "100.50").
/// Amounts are always hundredths; a zero-decimal currency must be a whole multiple of 100.
pub fn format_amount(amount: i64, currency: &str) -> SettleResult<String> {
  if amount < 0 {
    return Err(SettleError::validation("amount must not be negative"));
  }
  if ZERO_DECIMAL_CURRENCIES.contains(&currency.to_ascii_uppercase().as_str()) {
    if amount % 100 != 0 {
      return Err(SettleError::validation(format!(
        "{currency} has no minor unit; amount {amount} is not a multiple of 100"
      )));
    }
    return Ok((amount / 100).to_string());
  }
  Ok(format!("{}.{:02}", amount / 100, amount % 100))
}

fn approve_link(order: &JsonValue) -> Option<String> {
  order["links"]
    .as_array()?
    .iter()
    .find(|l| l["rel"] == "approve" || l["rel"] == "payer-action")
    .and_then(|l| l["href"].as_str())
    .map(String::from)
}

fn first_capture_id(order: &JsonValue) -> Option<String> {
  order["purchase_units"][0]["payments"]["captures"][0]["id"]
    .as_str()
    .map(String::from)
}

fn required_str(value: &JsonValue, field: &str, what: &str) -> SettleResult<String> {
  value[field].as_str().map(String::from).ok_or_else(|| SettleError::Upstream {
    status: None,
    body: format!("{what} response without '{field}': {value}"),
  })
}

#[async_trait]
impl PaymentGateway for PayPalGateway {
  #[instrument(skip(self, request), fields(order_id = %request.order_id, amount = request.amount, currency = %request.currency))]
  async fn create_intent(&self, request: &IntentRequest) -> SettleResult<PaymentIntent> {
    let value = format_amount(request.amount, &request.currency)?;
    let body = json!({
      "intent": "CAPTURE",
      "purchase_units": [{
        "reference_id": request.order_id,
        "custom_id": request.order_id,
        "description": request.description,
        "amount": {
          "currency_code": request.currency.to_ascii_uppercase(),
          "value": value,
        }
      }]
    });
    let order = self.post_json("/v2/checkout/orders", &body, "create order").await?;
    let intent = PaymentIntent {
      provider_order_id: required_str(&order, "id", "create order")?,
      status: order["status"].as_str().unwrap_or("CREATED").to_string(),
      approve_url: approve_link(&order),
    };
    info!(provider_order_id = %intent.provider_order_id, "Provider payment intent created.");
    Ok(intent)
  }

  #[instrument(skip(self))]
  async fn capture(&self, provider_order_id: &str) -> SettleResult<CaptureResult> {
    let path = format!("/v2/checkout/orders/{provider_order_id}/capture");
    let order = self.post_json(&path, &json!({}), "capture").await?;
    Ok(CaptureResult {
      provider_order_id: provider_order_id.to_string(),
      capture_id: first_capture_id(&order),
      status: order["status"].as_str().unwrap_or_default().to_string(),
    })
  }

  #[instrument(skip(self))]
  async fn refund(&self, capture_id: &str) -> SettleResult<RefundResult> {
    let path = format!("/v2/payments/captures/{capture_id}/refund");
    let refund = self.post_json(&path, &json!({}), "refund").await?;
    Ok(RefundResult {
      refund_id: required_str(&refund, "id", "refund")?,
      status: refund["status"].as_str().unwrap_or_default().to_string(),
    })
  }

  fn verify_notification(&self, headers: &NotificationHeaders, raw_body: &[u8]) -> bool {
    let Some(secret) = self.config.webhook_secret.as_deref() else {
      warn!("No webhook secret configured; accepting provider notification WITHOUT signature verification.");
      return true;
    };
    match verify_notification_signature(secret, &self.config.webhook_id, headers, raw_body, Utc::now()) {
      Ok(()) => true,
      Err(reason) => {
        warn!(
          reason,
          transmission_id = ?headers.transmission_id,
          cert_url = ?headers.cert_url,
          "Provider notification failed signature verification."
        );
        false
      }
    }
  }
}
