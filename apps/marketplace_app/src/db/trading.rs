// apps/marketplace_app/src/db/trading.rs

use super::{decode_error, storage_error};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tradeflow::store::{OrderRecord, StatusTransition, TradingStore};
use tradeflow::{Order, OrderStatus, Party, Payment, PaymentStatus, SettleError, SettleResult};
use tracing::debug;

const RECORD_COLUMNS: &str = "o.id, o.item_id, o.buyer_id, o.seller_id, o.status, o.created_at, o.updated_at, \
   o.is_deleted, p.id AS payment_id, p.amount, p.currency, p.method, p.status AS payment_status, p.paid_at, \
   p.slip_image_url, p.provider_order_id, p.provider_capture_id, p.buyer_token_rewarded, \
   p.seller_token_rewarded, p.created_at AS payment_created_at, p.updated_at AS payment_updated_at";

#[derive(Debug, Clone)]
pub struct PgTradingStore {
  pool: PgPool,
}

impl PgTradingStore {
  pub fn new(pool: PgPool) -> Self {
    PgTradingStore { pool }
  }

  async fn fetch_one_where(&self, condition: &str, value: &str) -> SettleResult<Option<OrderRecord>> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM orders o JOIN payments p ON p.order_id = o.id WHERE {condition}");
    let row = sqlx::query(&sql)
      .bind(value)
      .fetch_optional(&self.pool)
      .await
      .map_err(storage_error)?;
    row.as_ref().map(record_from_row).transpose()
  }

  async fn require(&self, order_id: &str) -> SettleResult<OrderRecord> {
    self
      .find(order_id)
      .await?
      .ok_or_else(|| SettleError::not_found(format!("order {order_id}")))
  }

  /// Explains a conditional update that matched no row.
  async fn lost_update(&self, order_id: &str, expected: OrderStatus) -> SettleError {
    match self.find(order_id).await {
      Ok(None) => SettleError::not_found(format!("order {order_id}")),
      Ok(Some(current)) => SettleError::conflict(format!(
        "order {order_id} expected {expected} but is {}{}",
        current.order.status,
        if current.order.is_deleted { " (deleted)" } else { "" }
      )),
      Err(e) => e,
    }
  }
}

fn record_from_row(row: &PgRow) -> SettleResult<OrderRecord> {
  let order_id: String = row.try_get("id").map_err(storage_error)?;
  let item_id: String = row.try_get("item_id").map_err(storage_error)?;
  let buyer_id: String = row.try_get("buyer_id").map_err(storage_error)?;
  let seller_id: String = row.try_get("seller_id").map_err(storage_error)?;
  let status: String = row.try_get("status").map_err(storage_error)?;
  let method: String = row.try_get("method").map_err(storage_error)?;
  let payment_status: String = row.try_get("payment_status").map_err(storage_error)?;

  Ok(OrderRecord {
    order: Order {
      id: order_id.clone(),
      item_id: item_id.clone(),
      buyer_id: buyer_id.clone(),
      seller_id: seller_id.clone(),
      status: status.parse().map_err(decode_error)?,
      created_at: row.try_get("created_at").map_err(storage_error)?,
      updated_at: row.try_get("updated_at").map_err(storage_error)?,
      is_deleted: row.try_get("is_deleted").map_err(storage_error)?,
    },
    payment: Payment {
      id: row.try_get("payment_id").map_err(storage_error)?,
      order_id,
      item_id,
      buyer_id,
      seller_id,
      amount: row.try_get("amount").map_err(storage_error)?,
      currency: row.try_get("currency").map_err(storage_error)?,
      method: method.parse().map_err(decode_error)?,
      status: payment_status.parse().map_err(decode_error)?,
      paid_at: row.try_get("paid_at").map_err(storage_error)?,
      slip_image_url: row.try_get("slip_image_url").map_err(storage_error)?,
      provider_order_id: row.try_get("provider_order_id").map_err(storage_error)?,
      provider_capture_id: row.try_get("provider_capture_id").map_err(storage_error)?,
      buyer_token_rewarded: row.try_get("buyer_token_rewarded").map_err(storage_error)?,
      seller_token_rewarded: row.try_get("seller_token_rewarded").map_err(storage_error)?,
      created_at: row.try_get("payment_created_at").map_err(storage_error)?,
      updated_at: row.try_get("payment_updated_at").map_err(storage_error)?,
    },
  })
}

fn order_from_row(row: &PgRow) -> SettleResult<Order> {
  let status: String = row.try_get("status").map_err(storage_error)?;
  Ok(Order {
    id: row.try_get("id").map_err(storage_error)?,
    item_id: row.try_get("item_id").map_err(storage_error)?,
    buyer_id: row.try_get("buyer_id").map_err(storage_error)?,
    seller_id: row.try_get("seller_id").map_err(storage_error)?,
    status: status.parse().map_err(decode_error)?,
    created_at: row.try_get("created_at").map_err(storage_error)?,
    updated_at: row.try_get("updated_at").map_err(storage_error)?,
    is_deleted: row.try_get("is_deleted").map_err(storage_error)?,
  })
}

fn reward_column(party: Party) -> &'static str {
  match party {
    Party::Buyer => "buyer_token_rewarded",
    Party::Seller => "seller_token_rewarded",
  }
}

#[async_trait]
impl TradingStore for PgTradingStore {
  async fn insert(&self, record: &OrderRecord) -> SettleResult<()> {
    let (order, payment) = (&record.order, &record.payment);
    let mut tx = self.pool.begin().await.map_err(storage_error)?;
    sqlx::query(
      "INSERT INTO orders (id, item_id, buyer_id, seller_id, status, created_at, updated_at, is_deleted) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(&order.id)
    .bind(&order.item_id)
    .bind(&order.buyer_id)
    .bind(&order.seller_id)
    .bind(order.status.as_str())
    .bind(order.created_at)
    .bind(order.updated_at)
    .bind(order.is_deleted)
    .execute(&mut *tx)
    .await
    .map_err(storage_error)?;
    sqlx::query(
      "INSERT INTO payments (id, order_id, item_id, buyer_id, seller_id, amount, currency, method, status, \
       paid_at, slip_image_url, provider_order_id, provider_capture_id, buyer_token_rewarded, \
       seller_token_rewarded, created_at, updated_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
    )
    .bind(&payment.id)
    .bind(&payment.order_id)
    .bind(&payment.item_id)
    .bind(&payment.buyer_id)
    .bind(&payment.seller_id)
    .bind(payment.amount)
    .bind(&payment.currency)
    .bind(payment.method.as_str())
    .bind(payment.status.as_str())
    .bind(payment.paid_at)
    .bind(&payment.slip_image_url)
    .bind(&payment.provider_order_id)
    .bind(&payment.provider_capture_id)
    .bind(payment.buyer_token_rewarded)
    .bind(payment.seller_token_rewarded)
    .bind(payment.created_at)
    .bind(payment.updated_at)
    .execute(&mut *tx)
    .await
    .map_err(storage_error)?;
    tx.commit().await.map_err(storage_error)
  }

  async fn find(&self, order_id: &str) -> SettleResult<Option<OrderRecord>> {
    self.fetch_one_where("o.id = $1", order_id).await
  }

  async fn find_by_provider_order(&self, provider_order_id: &str) -> SettleResult<Option<OrderRecord>> {
    self.fetch_one_where("p.provider_order_id = $1", provider_order_id).await
  }

  async fn list_for_user(&self, user_id: &str) -> SettleResult<Vec<Order>> {
    let rows = sqlx::query(
      "SELECT id, item_id, buyer_id, seller_id, status, created_at, updated_at, is_deleted FROM orders \
       WHERE NOT is_deleted AND (buyer_id = $1 OR seller_id = $1) ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(&self.pool)
    .await
    .map_err(storage_error)?;
    rows.iter().map(order_from_row).collect()
  }

  async fn apply_transition(&self, t: &StatusTransition) -> SettleResult<OrderRecord> {
    let mut tx = self.pool.begin().await.map_err(storage_error)?;
    let moved = sqlx::query(
      "UPDATE orders SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4 AND NOT is_deleted",
    )
    .bind(t.to.as_str())
    .bind(t.at)
    .bind(&t.order_id)
    .bind(t.from.as_str())
    .execute(&mut *tx)
    .await
    .map_err(storage_error)?
    .rows_affected();
    if moved == 0 {
      tx.rollback().await.map_err(storage_error)?;
      return Err(self.lost_update(&t.order_id, t.from).await);
    }

    // paid_at is written once; later transitions (refund) keep it.
    sqlx::query(
      "UPDATE payments SET status = COALESCE($1, status), paid_at = COALESCE(paid_at, $2), \
       slip_image_url = COALESCE($3, slip_image_url), provider_capture_id = COALESCE($4, provider_capture_id), \
       updated_at = $5 WHERE order_id = $6",
    )
    .bind(t.payment_status.map(|s| s.as_str()))
    .bind(t.paid_at)
    .bind(&t.slip_image_url)
    .bind(&t.provider_capture_id)
    .bind(t.at)
    .bind(&t.order_id)
    .execute(&mut *tx)
    .await
    .map_err(storage_error)?;
    tx.commit().await.map_err(storage_error)?;
    debug!(order_id = %t.order_id, from = %t.from, to = %t.to, "Transition committed.");
    self.require(&t.order_id).await
  }

  async fn attach_provider_order(
    &self,
    order_id: &str,
    expected: OrderStatus,
    provider_order_id: &str,
    at: DateTime<Utc>,
  ) -> SettleResult<OrderRecord> {
    let updated = sqlx::query(
      "UPDATE payments p SET provider_order_id = $1, updated_at = $2 FROM orders o \
       WHERE p.order_id = o.id AND o.id = $3 AND o.status = $4 AND NOT o.is_deleted",
    )
    .bind(provider_order_id)
    .bind(at)
    .bind(order_id)
    .bind(expected.as_str())
    .execute(&self.pool)
    .await
    .map_err(storage_error)?
    .rows_affected();
    if updated == 0 {
      return Err(self.lost_update(order_id, expected).await);
    }
    self.require(order_id).await
  }

  async fn mark_rewarded(&self, order_id: &str, party: Party, at: DateTime<Utc>) -> SettleResult<bool> {
    let column = reward_column(party);
    let sql = format!(
      "UPDATE payments SET {column} = TRUE, updated_at = $1 WHERE order_id = $2 AND status = $3 AND {column} = FALSE"
    );
    let flipped = sqlx::query(&sql)
      .bind(at)
      .bind(order_id)
      .bind(PaymentStatus::Paid.as_str())
      .execute(&self.pool)
      .await
      .map_err(storage_error)?
      .rows_affected();
    if flipped == 1 {
      return Ok(true);
    }

    let current = self.require(order_id).await?;
    if current.payment.status != PaymentStatus::Paid {
      return Err(SettleError::invalid_state(order_id, "mark_rewarded", current.payment.status));
    }
    Ok(false)
  }

  async fn soft_delete(&self, order_id: &str, expected: OrderStatus, at: DateTime<Utc>) -> SettleResult<OrderRecord> {
    let deleted = sqlx::query(
      "UPDATE orders SET is_deleted = TRUE, updated_at = $1 WHERE id = $2 AND status = $3 AND NOT is_deleted",
    )
    .bind(at)
    .bind(order_id)
    .bind(expected.as_str())
    .execute(&self.pool)
    .await
    .map_err(storage_error)?
    .rows_affected();
    if deleted == 0 {
      return Err(self.lost_update(order_id, expected).await);
    }
    self.require(order_id).await
  }
}
