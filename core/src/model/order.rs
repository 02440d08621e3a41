// core/src/model/order.rs

use super::ParseEnumError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
  PendingPayment,
  PaidPendingVerify,
  PaidVerified,
  Fulfilled,
  Cancelled,
  Refunded,
}

impl OrderStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      OrderStatus::PendingPayment => "PENDING_PAYMENT",
      OrderStatus::PaidPendingVerify => "PAID_PENDING_VERIFY",
      OrderStatus::PaidVerified => "PAID_VERIFIED",
      OrderStatus::Fulfilled => "FULFILLED",
      OrderStatus::Cancelled => "CANCELLED",
      OrderStatus::Refunded => "REFUNDED",
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, OrderStatus::Fulfilled | OrderStatus::Cancelled | OrderStatus::Refunded)
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for OrderStatus {
  type Err = ParseEnumError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "PENDING_PAYMENT" => Ok(OrderStatus::PendingPayment),
      "PAID_PENDING_VERIFY" => Ok(OrderStatus::PaidPendingVerify),
      "PAID_VERIFIED" => Ok(OrderStatus::PaidVerified),
      "FULFILLED" => Ok(OrderStatus::Fulfilled),
      "CANCELLED" => Ok(OrderStatus::Cancelled),
      "REFUNDED" => Ok(OrderStatus::Refunded),
      other => Err(ParseEnumError {
        kind: "order status",
        value: other.to_string(),
      }),
    }
  }
}

/// A single trade between a buyer and a seller over one item.
/// The item and both users live in other partitions and are referenced by id only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub id: String,
  pub item_id: String,
  pub buyer_id: String,
  pub seller_id: String,
  pub status: OrderStatus,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub is_deleted: bool,
}

impl Order {
  pub fn is_buyer(&self, user_id: &str) -> bool {
    self.buyer_id == user_id
  }

  pub fn is_seller(&self, user_id: &str) -> bool {
    self.seller_id == user_id
  }
}
