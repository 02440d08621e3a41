// core/src/store/memory.rs

//! In-process partitions backed by `DashMap`.
//!
//! Each record is guarded by its shard lock for the duration of one
//! compare-and-set. Shard guards are never held across an `.await`.

use super::{ItemCatalog, ItemRef, OrderRecord, StatusTransition, StoreRegistry, TokenStore, TradingStore, UserDirectory, UserRef};
use crate::error::{SettleError, SettleResult};
use crate::model::{
  CreditOutcome, CreditRequest, Order, OrderStatus, Party, PaymentStatus, TokenLedgerEntry, TokenTransaction,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct MemoryTradingStore {
  records: DashMap<String, OrderRecord>,
}

impl MemoryTradingStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl TradingStore for MemoryTradingStore {
  async fn insert(&self, record: &OrderRecord) -> SettleResult<()> {
    match self.records.entry(record.order.id.clone()) {
      Entry::Occupied(_) => Err(SettleError::conflict(format!("order {} already exists", record.order.id))),
      Entry::Vacant(slot) => {
        slot.insert(record.clone());
        Ok(())
      }
    }
  }

  async fn find(&self, order_id: &str) -> SettleResult<Option<OrderRecord>> {
    Ok(self.records.get(order_id).map(|r| r.value().clone()))
  }

  async fn find_by_provider_order(&self, provider_order_id: &str) -> SettleResult<Option<OrderRecord>> {
    Ok(
      self
        .records
        .iter()
        .find(|r| r.payment.provider_order_id.as_deref() == Some(provider_order_id))
        .map(|r| r.value().clone()),
    )
  }

  async fn list_for_user(&self, user_id: &str) -> SettleResult<Vec<Order>> {
    let mut orders: Vec<Order> = self
      .records
      .iter()
      .filter(|r| !r.order.is_deleted && (r.order.is_buyer(user_id) || r.order.is_seller(user_id)))
      .map(|r| r.order.clone())
      .collect();
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(orders)
  }

  async fn apply_transition(&self, t: &StatusTransition) -> SettleResult<OrderRecord> {
    let mut record = self
      .records
      .get_mut(&t.order_id)
      .ok_or_else(|| SettleError::not_found(format!("order {}", t.order_id)))?;

    if record.order.is_deleted || record.order.status != t.from {
      return Err(SettleError::conflict(format!(
        "order {} expected {} but is {}{}",
        t.order_id,
        t.from,
        record.order.status,
        if record.order.is_deleted { " (deleted)" } else { "" }
      )));
    }

    record.order.status = t.to;
    record.order.updated_at = t.at;
    let payment = &mut record.payment;
    if let Some(status) = t.payment_status {
      payment.status = status;
    }
    if payment.paid_at.is_none() {
      payment.paid_at = t.paid_at;
    }
    if let Some(url) = &t.slip_image_url {
      payment.slip_image_url = Some(url.clone());
    }
    if let Some(capture) = &t.provider_capture_id {
      payment.provider_capture_id = Some(capture.clone());
    }
    payment.updated_at = t.at;
    Ok(record.value().clone())
  }

  async fn attach_provider_order(
    &self,
    order_id: &str,
    expected: OrderStatus,
    provider_order_id: &str,
    at: DateTime<Utc>,
  ) -> SettleResult<OrderRecord> {
    let mut record = self
      .records
      .get_mut(order_id)
      .ok_or_else(|| SettleError::not_found(format!("order {order_id}")))?;
    if record.order.is_deleted || record.order.status != expected {
      return Err(SettleError::conflict(format!(
        "order {order_id} left {expected} before the provider order was attached"
      )));
    }
    record.payment.provider_order_id = Some(provider_order_id.to_string());
    record.payment.updated_at = at;
    record.order.updated_at = at;
    Ok(record.value().clone())
  }

  async fn mark_rewarded(&self, order_id: &str, party: Party, at: DateTime<Utc>) -> SettleResult<bool> {
    let mut record = self
      .records
      .get_mut(order_id)
      .ok_or_else(|| SettleError::not_found(format!("order {order_id}")))?;
    if record.payment.status != PaymentStatus::Paid {
      return Err(SettleError::invalid_state(order_id, "mark_rewarded", record.payment.status));
    }
    let flag = match party {
      Party::Buyer => &mut record.payment.buyer_token_rewarded,
      Party::Seller => &mut record.payment.seller_token_rewarded,
    };
    if *flag {
      return Ok(false);
    }
    *flag = true;
    record.payment.updated_at = at;
    Ok(true)
  }

  async fn soft_delete(&self, order_id: &str, expected: OrderStatus, at: DateTime<Utc>) -> SettleResult<OrderRecord> {
    let mut record = self
      .records
      .get_mut(order_id)
      .ok_or_else(|| SettleError::not_found(format!("order {order_id}")))?;
    if record.order.is_deleted || record.order.status != expected {
      return Err(SettleError::conflict(format!("order {order_id} changed before delete")));
    }
    record.order.is_deleted = true;
    record.order.updated_at = at;
    Ok(record.value().clone())
  }
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
  entries: DashMap<String, TokenLedgerEntry>,
  journal: DashMap<String, TokenTransaction>,
}

impl MemoryTokenStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn journal_len(&self) -> usize {
    self.journal.len()
  }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
  async fn entry(&self, owner_id: &str) -> SettleResult<Option<TokenLedgerEntry>> {
    Ok(self.entries.get(owner_id).map(|e| e.value().clone()))
  }

  async fn apply_credit(&self, req: &CreditRequest) -> SettleResult<CreditOutcome> {
    let now = Utc::now();
    // Journal slot first, entry second: the only lock order used here.
    let journal_slot = match self.journal.entry(req.idempotency_key.clone()) {
      Entry::Occupied(_) => return Ok(CreditOutcome::AlreadyApplied),
      Entry::Vacant(slot) => slot,
    };

    let updated = match self.entries.entry(req.owner_id.clone()) {
      Entry::Occupied(mut current) => {
        if Some(current.get().version) != req.expected_version {
          return Err(SettleError::conflict(format!(
            "ledger entry for {} is at version {}, expected {:?}",
            req.owner_id,
            current.get().version,
            req.expected_version
          )));
        }
        let balance = current.get().balance + req.amount;
        if balance < 0 {
          return Err(SettleError::validation(format!("balance for {} would go negative", req.owner_id)));
        }
        let entry = current.get_mut();
        entry.balance = balance;
        entry.version += 1;
        entry.updated_at = now;
        entry.clone()
      }
      Entry::Vacant(slot) => {
        if req.expected_version.is_some() {
          return Err(SettleError::conflict(format!("ledger entry for {} disappeared", req.owner_id)));
        }
        if req.amount < 0 {
          return Err(SettleError::validation(format!("balance for {} would go negative", req.owner_id)));
        }
        slot
          .insert(TokenLedgerEntry {
            owner_id: req.owner_id.clone(),
            balance: req.amount,
            version: 1,
            updated_at: now,
          })
          .clone()
      }
    };

    journal_slot.insert(TokenTransaction {
      idempotency_key: req.idempotency_key.clone(),
      owner_id: req.owner_id.clone(),
      amount: req.amount,
      reason: req.reason.clone(),
      created_at: now,
    });
    Ok(CreditOutcome::Applied(updated))
  }

  async fn has_transaction(&self, idempotency_key: &str) -> SettleResult<bool> {
    Ok(self.journal.contains_key(idempotency_key))
  }
}

/// Users and items, standing in for the external catalog collaborators.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
  users: DashMap<String, UserRef>,
  items: DashMap<String, ItemRef>,
}

impl MemoryDirectory {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_user(&self, id: &str, display_name: &str) {
    self.users.insert(
      id.to_string(),
      UserRef {
        id: id.to_string(),
        display_name: display_name.to_string(),
      },
    );
  }

  pub fn add_item(&self, id: &str, seller_id: &str, title: &str) {
    self.items.insert(
      id.to_string(),
      ItemRef {
        id: id.to_string(),
        seller_id: seller_id.to_string(),
        title: title.to_string(),
      },
    );
  }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
  async fn find_user(&self, user_id: &str) -> SettleResult<Option<UserRef>> {
    Ok(self.users.get(user_id).map(|u| u.value().clone()))
  }
}

#[async_trait]
impl ItemCatalog for MemoryDirectory {
  async fn find_item(&self, item_id: &str) -> SettleResult<Option<ItemRef>> {
    Ok(self.items.get(item_id).map(|i| i.value().clone()))
  }
}

/// Concrete in-memory partitions, kept typed so tests can seed and inspect them.
#[derive(Debug, Clone, Default)]
pub struct MemoryStores {
  pub trading: Arc<MemoryTradingStore>,
  pub tokens: Arc<MemoryTokenStore>,
  pub directory: Arc<MemoryDirectory>,
}

impl MemoryStores {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn registry(&self) -> StoreRegistry {
    StoreRegistry::new(
      self.trading.clone(),
      self.tokens.clone(),
      self.directory.clone(),
      self.directory.clone(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn credit(owner: &str, amount: i64, expected: Option<u64>, key: &str) -> CreditRequest {
    CreditRequest {
      owner_id: owner.to_string(),
      amount,
      expected_version: expected,
      idempotency_key: key.to_string(),
      reason: "test".to_string(),
    }
  }

  #[tokio::test]
  async fn credit_creates_entry_then_requires_matching_version() {
    let store = MemoryTokenStore::new();
    let first = store.apply_credit(&credit("u1", 10, None, "k1")).await.unwrap();
    let entry = match first {
      CreditOutcome::Applied(entry) => entry,
      other => panic!("expected Applied, got {other:?}"),
    };
    assert_eq!((entry.balance, entry.version), (10, 1));

    let stale = store.apply_credit(&credit("u1", 5, None, "k2")).await;
    assert!(matches!(stale, Err(SettleError::Conflict(_))));
    // The rejected write must not have consumed its key.
    assert!(!store.has_transaction("k2").await.unwrap());

    store.apply_credit(&credit("u1", 5, Some(1), "k2")).await.unwrap();
    assert_eq!(store.entry("u1").await.unwrap().unwrap().balance, 15);
  }

  #[tokio::test]
  async fn replayed_key_is_a_no_op() {
    let store = MemoryTokenStore::new();
    store.apply_credit(&credit("u1", 10, None, "k1")).await.unwrap();
    let again = store.apply_credit(&credit("u1", 10, Some(1), "k1")).await.unwrap();
    assert_eq!(again, CreditOutcome::AlreadyApplied);
    assert_eq!(store.entry("u1").await.unwrap().unwrap().balance, 10);
    assert_eq!(store.journal_len(), 1);
  }

  #[tokio::test]
  async fn debit_below_zero_is_rejected() {
    let store = MemoryTokenStore::new();
    store.apply_credit(&credit("u1", 3, None, "k1")).await.unwrap();
    let res = store.apply_credit(&credit("u1", -4, Some(1), "k2")).await;
    assert!(matches!(res, Err(SettleError::Validation(_))));
    assert_eq!(store.entry("u1").await.unwrap().unwrap().balance, 3);
  }
}
