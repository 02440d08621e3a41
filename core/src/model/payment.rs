// core/src/model/payment.rs

use super::{Party, ParseEnumError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
  Cash,
  Transfer,
  Promptpay,
  Card,
  Paypal,
}

impl PaymentMethod {
  pub fn as_str(&self) -> &'static str {
    match self {
      PaymentMethod::Cash => "cash",
      PaymentMethod::Transfer => "transfer",
      PaymentMethod::Promptpay => "promptpay",
      PaymentMethod::Card => "card",
      PaymentMethod::Paypal => "paypal",
    }
  }

  /// Manual methods settle through an uploaded slip and a seller verification.
  pub fn is_manual(&self) -> bool {
    matches!(self, PaymentMethod::Cash | PaymentMethod::Transfer | PaymentMethod::Promptpay)
  }

  /// Gateway methods settle through the payment provider and its webhook.
  pub fn is_gateway(&self) -> bool {
    !self.is_manual()
  }
}

impl fmt::Display for PaymentMethod {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for PaymentMethod {
  type Err = ParseEnumError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "cash" => Ok(PaymentMethod::Cash),
      "transfer" => Ok(PaymentMethod::Transfer),
      "promptpay" => Ok(PaymentMethod::Promptpay),
      "card" => Ok(PaymentMethod::Card),
      "paypal" => Ok(PaymentMethod::Paypal),
      _ => Err(ParseEnumError {
        kind: "payment method",
        value: s.to_string(),
      }),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
  Pending,
  Paid,
  Failed,
  Refunded,
}

impl PaymentStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      PaymentStatus::Pending => "pending",
      PaymentStatus::Paid => "paid",
      PaymentStatus::Failed => "failed",
      PaymentStatus::Refunded => "refunded",
    }
  }
}

impl fmt::Display for PaymentStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for PaymentStatus {
  type Err = ParseEnumError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "pending" => Ok(PaymentStatus::Pending),
      "paid" => Ok(PaymentStatus::Paid),
      "failed" => Ok(PaymentStatus::Failed),
      "refunded" => Ok(PaymentStatus::Refunded),
      other => Err(ParseEnumError {
        kind: "payment status",
        value: other.to_string(),
      }),
    }
  }
}

/// Settlement record for an order. Stored next to the order in the trading
/// partition but as its own row, with the order's references denormalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
  pub id: String,
  pub order_id: String,
  pub item_id: String,
  pub buyer_id: String,
  pub seller_id: String,
  /// Hundredths of the currency unit (satang, cents), for every currency.
  /// Zero-decimal currencies (JPY, HUF, TWD) must be whole multiples of 100.
  /// Never negative.
  pub amount: i64,
  pub currency: String,
  pub method: PaymentMethod,
  pub status: PaymentStatus,
  pub paid_at: Option<DateTime<Utc>>,
  pub slip_image_url: Option<String>,
  pub provider_order_id: Option<String>,
  pub provider_capture_id: Option<String>,
  pub buyer_token_rewarded: bool,
  pub seller_token_rewarded: bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Payment {
  pub fn is_rewarded(&self, party: Party) -> bool {
    match party {
      Party::Buyer => self.buyer_token_rewarded,
      Party::Seller => self.seller_token_rewarded,
    }
  }

  pub fn party_id(&self, party: Party) -> &str {
    match party {
      Party::Buyer => &self.buyer_id,
      Party::Seller => &self.seller_id,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn manual_and_gateway_methods_partition_the_set() {
    let manual: Vec<_> = [
      PaymentMethod::Cash,
      PaymentMethod::Transfer,
      PaymentMethod::Promptpay,
      PaymentMethod::Card,
      PaymentMethod::Paypal,
    ]
    .into_iter()
    .filter(PaymentMethod::is_manual)
    .collect();
    assert_eq!(manual, vec![PaymentMethod::Cash, PaymentMethod::Transfer, PaymentMethod::Promptpay]);
    assert!(PaymentMethod::Paypal.is_gateway());
    assert!(PaymentMethod::Card.is_gateway());
  }

  #[test]
  fn method_parsing_is_case_insensitive() {
    assert_eq!("PromptPay".parse::<PaymentMethod>().unwrap(), PaymentMethod::Promptpay);
    assert!("bitcoin".parse::<PaymentMethod>().is_err());
  }
}
