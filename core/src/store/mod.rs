// core/src/store/mod.rs

//! Partitioned storage seams.
//!
//! The trading partition (orders + payments), the token partition (ledger +
//! journal) and the user/item directory are separate stores. Nothing joins
//! across them: a component that needs a buyer and a ledger entry makes two
//! calls by id. Every mutating call that guards an invariant is a
//! compare-and-set and reports a lost race as [`SettleError::Conflict`].

pub mod memory;

use crate::error::SettleResult;
use crate::model::{
  CreditOutcome, CreditRequest, Order, OrderStatus, Party, Payment, PaymentStatus, TokenLedgerEntry,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[cfg(doc)]
use crate::error::SettleError;

/// An order and its payment, always read and written together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
  pub order: Order,
  pub payment: Payment,
}

/// One guarded status change. The store applies it only if the order is not
/// deleted and its status is still `from` at write time; otherwise the whole
/// write is rejected with `Conflict` and nothing changes.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusTransition {
  pub order_id: String,
  pub from: OrderStatus,
  pub to: OrderStatus,
  pub payment_status: Option<PaymentStatus>,
  /// Written only while the payment's `paid_at` is still empty.
  pub paid_at: Option<DateTime<Utc>>,
  pub slip_image_url: Option<String>,
  pub provider_capture_id: Option<String>,
  pub at: DateTime<Utc>,
}

impl StatusTransition {
  pub fn new(order_id: impl Into<String>, from: OrderStatus, to: OrderStatus, at: DateTime<Utc>) -> Self {
    StatusTransition {
      order_id: order_id.into(),
      from,
      to,
      payment_status: None,
      paid_at: None,
      slip_image_url: None,
      provider_capture_id: None,
      at,
    }
  }

  pub fn with_payment_status(mut self, status: PaymentStatus) -> Self {
    self.payment_status = Some(status);
    self
  }

  pub fn with_paid_at(mut self, paid_at: DateTime<Utc>) -> Self {
    self.paid_at = Some(paid_at);
    self
  }

  pub fn with_slip(mut self, url: impl Into<String>) -> Self {
    self.slip_image_url = Some(url.into());
    self
  }

  pub fn with_capture(mut self, capture_id: Option<String>) -> Self {
    self.provider_capture_id = capture_id;
    self
  }
}

/// Orders and payments ("trading" partition).
#[async_trait]
pub trait TradingStore: Send + Sync {
  async fn insert(&self, record: &OrderRecord) -> SettleResult<()>;

  async fn find(&self, order_id: &str) -> SettleResult<Option<OrderRecord>>;

  async fn find_by_provider_order(&self, provider_order_id: &str) -> SettleResult<Option<OrderRecord>>;

  /// Non-deleted orders where the user is the buyer or the seller, newest first.
  async fn list_for_user(&self, user_id: &str) -> SettleResult<Vec<Order>>;

  async fn apply_transition(&self, transition: &StatusTransition) -> SettleResult<OrderRecord>;

  /// Records the provider-side order id while the order is still `expected`.
  async fn attach_provider_order(
    &self,
    order_id: &str,
    expected: OrderStatus,
    provider_order_id: &str,
    at: DateTime<Utc>,
  ) -> SettleResult<OrderRecord>;

  /// Flips one reward flag false -> true. Returns `true` if this call flipped it,
  /// `false` if it was already set. Fails with `InvalidState` unless the payment is paid.
  async fn mark_rewarded(&self, order_id: &str, party: Party, at: DateTime<Utc>) -> SettleResult<bool>;

  /// Soft delete, allowed only while the order is still `expected`.
  async fn soft_delete(&self, order_id: &str, expected: OrderStatus, at: DateTime<Utc>) -> SettleResult<OrderRecord>;
}

/// Token balances and the credit journal ("token" partition).
#[async_trait]
pub trait TokenStore: Send + Sync {
  async fn entry(&self, owner_id: &str) -> SettleResult<Option<TokenLedgerEntry>>;

  /// Applies `amount` to the balance if the entry is still at `expected_version`
  /// and the idempotency key is new. The journal row and the balance change
  /// commit together.
  async fn apply_credit(&self, request: &CreditRequest) -> SettleResult<CreditOutcome>;

  async fn has_transaction(&self, idempotency_key: &str) -> SettleResult<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
  pub id: String,
  pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRef {
  pub id: String,
  pub seller_id: String,
  pub title: String,
}

/// Lookups into the user/profile partition.
#[async_trait]
pub trait UserDirectory: Send + Sync {
  async fn find_user(&self, user_id: &str) -> SettleResult<Option<UserRef>>;
}

/// Lookups into the item catalog.
#[async_trait]
pub trait ItemCatalog: Send + Sync {
  async fn find_item(&self, item_id: &str) -> SettleResult<Option<ItemRef>>;
}

/// Handles to every partition, built once at start-up and handed to the
/// components that need them.
#[derive(Clone)]
pub struct StoreRegistry {
  pub trading: Arc<dyn TradingStore>,
  pub tokens: Arc<dyn TokenStore>,
  pub users: Arc<dyn UserDirectory>,
  pub items: Arc<dyn ItemCatalog>,
}

impl StoreRegistry {
  pub fn new(
    trading: Arc<dyn TradingStore>,
    tokens: Arc<dyn TokenStore>,
    users: Arc<dyn UserDirectory>,
    items: Arc<dyn ItemCatalog>,
  ) -> Self {
    StoreRegistry {
      trading,
      tokens,
      users,
      items,
    }
  }
}

impl std::fmt::Debug for StoreRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StoreRegistry").finish_non_exhaustive()
  }
}
