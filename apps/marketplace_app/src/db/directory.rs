// apps/marketplace_app/src/db/directory.rs

use super::storage_error;
use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;
use tradeflow::store::{ItemCatalog, ItemRef, UserDirectory, UserRef};
use tradeflow::SettleResult;

/// Read-only view of the user/profile partition.
#[derive(Debug, Clone)]
pub struct PgDirectory {
  pool: PgPool,
}

impl PgDirectory {
  pub fn new(pool: PgPool) -> Self {
    PgDirectory { pool }
  }
}

#[async_trait]
impl UserDirectory for PgDirectory {
  async fn find_user(&self, user_id: &str) -> SettleResult<Option<UserRef>> {
    let row = sqlx::query("SELECT id, display_name FROM users WHERE id = $1")
      .bind(user_id)
      .fetch_optional(&self.pool)
      .await
      .map_err(storage_error)?;
    row
      .map(|r| -> SettleResult<UserRef> {
        Ok(UserRef {
          id: r.try_get("id").map_err(storage_error)?,
          display_name: r.try_get("display_name").map_err(storage_error)?,
        })
      })
      .transpose()
  }
}

#[async_trait]
impl ItemCatalog for PgDirectory {
  async fn find_item(&self, item_id: &str) -> SettleResult<Option<ItemRef>> {
    let row = sqlx::query("SELECT id, seller_id, title FROM items WHERE id = $1 AND NOT is_deleted")
      .bind(item_id)
      .fetch_optional(&self.pool)
      .await
      .map_err(storage_error)?;
    row
      .map(|r| -> SettleResult<ItemRef> {
        Ok(ItemRef {
          id: r.try_get("id").map_err(storage_error)?,
          seller_id: r.try_get("seller_id").map_err(storage_error)?,
          title: r.try_get("title").map_err(storage_error)?,
        })
      })
      .transpose()
  }
}
