// apps/marketplace_app/src/db/tokens.rs

use super::{storage_error, version_from_db, version_to_db};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tradeflow::model::{CreditOutcome, CreditRequest};
use tradeflow::store::TokenStore;
use tradeflow::{SettleError, SettleResult, TokenLedgerEntry};

#[derive(Debug, Clone)]
pub struct PgTokenStore {
  pool: PgPool,
}

impl PgTokenStore {
  pub fn new(pool: PgPool) -> Self {
    PgTokenStore { pool }
  }
}

fn entry_from_row(row: &PgRow) -> SettleResult<TokenLedgerEntry> {
  Ok(TokenLedgerEntry {
    owner_id: row.try_get("owner_id").map_err(storage_error)?,
    balance: row.try_get("balance").map_err(storage_error)?,
    version: version_from_db(row.try_get("version").map_err(storage_error)?),
    updated_at: row.try_get("updated_at").map_err(storage_error)?,
  })
}

#[async_trait]
impl TokenStore for PgTokenStore {
  async fn entry(&self, owner_id: &str) -> SettleResult<Option<TokenLedgerEntry>> {
    let row = sqlx::query("SELECT owner_id, balance, version, updated_at FROM token_ledger WHERE owner_id = $1")
      .bind(owner_id)
      .fetch_optional(&self.pool)
      .await
      .map_err(storage_error)?;
    row.as_ref().map(entry_from_row).transpose()
  }

  /// Journal insert and balance update share one transaction. A concurrent
  /// writer with the same key blocks on the journal's primary key and then
  /// sees the row, so the credit lands once.
  async fn apply_credit(&self, req: &CreditRequest) -> SettleResult<CreditOutcome> {
    let now = Utc::now();
    let mut tx = self.pool.begin().await.map_err(storage_error)?;

    let journaled = sqlx::query(
      "INSERT INTO token_transactions (idempotency_key, owner_id, amount, reason, created_at) \
       VALUES ($1, $2, $3, $4, $5) ON CONFLICT (idempotency_key) DO NOTHING",
    )
    .bind(&req.idempotency_key)
    .bind(&req.owner_id)
    .bind(req.amount)
    .bind(&req.reason)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(storage_error)?
    .rows_affected();
    if journaled == 0 {
      tx.rollback().await.map_err(storage_error)?;
      return Ok(CreditOutcome::AlreadyApplied);
    }

    let row = match req.expected_version {
      Some(version) => sqlx::query(
        "UPDATE token_ledger SET balance = balance + $1, version = version + 1, updated_at = $2 \
         WHERE owner_id = $3 AND version = $4 AND balance + $1 >= 0 \
         RETURNING owner_id, balance, version, updated_at",
      )
      .bind(req.amount)
      .bind(now)
      .bind(&req.owner_id)
      .bind(version_to_db(version))
      .fetch_optional(&mut *tx)
      .await
      .map_err(storage_error)?,
      None => {
        if req.amount < 0 {
          return Err(SettleError::validation(format!("balance for {} would go negative", req.owner_id)));
        }
        sqlx::query(
          "INSERT INTO token_ledger (owner_id, balance, version, updated_at) VALUES ($1, $2, 1, $3) \
           ON CONFLICT (owner_id) DO NOTHING RETURNING owner_id, balance, version, updated_at",
        )
        .bind(&req.owner_id)
        .bind(req.amount)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage_error)?
      }
    };

    let Some(row) = row else {
      tx.rollback().await.map_err(storage_error)?;
      // Same version but no row updated means the balance check failed.
      let current = self.entry(&req.owner_id).await?;
      return match (current, req.expected_version) {
        (Some(entry), Some(expected)) if entry.version == expected => Err(SettleError::validation(format!(
          "balance for {} would go negative",
          req.owner_id
        ))),
        (current, expected) => Err(SettleError::conflict(format!(
          "ledger entry for {} is at version {:?}, expected {:?}",
          req.owner_id,
          current.map(|e| e.version),
          expected
        ))),
      };
    };
    let entry = entry_from_row(&row)?;
    tx.commit().await.map_err(storage_error)?;
    Ok(CreditOutcome::Applied(entry))
  }

  async fn has_transaction(&self, idempotency_key: &str) -> SettleResult<bool> {
    let row = sqlx::query("SELECT 1 AS present FROM token_transactions WHERE idempotency_key = $1")
      .bind(idempotency_key)
      .fetch_optional(&self.pool)
      .await
      .map_err(storage_error)?;
    Ok(row.is_some())
  }
}
