// apps/marketplace_app/src/db/mod.rs

//! PostgreSQL implementations of the settlement store traits.
//!
//! Each partition has its own pool and database. Status and flag changes are
//! conditional `UPDATE ... WHERE <expected>` statements; zero affected rows is
//! a lost compare-and-set and surfaces as `SettleError::Conflict`.

mod directory;
mod tokens;
mod trading;

pub use directory::PgDirectory;
pub use tokens::PgTokenStore;
pub use trading::PgTradingStore;

use crate::config::AppConfig;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use tracing::info;
use tradeflow::{SettleError, StoreRegistry};

const TRADING_SCHEMA: &str = include_str!("../../schema/trading.sql");
const TOKEN_SCHEMA: &str = include_str!("../../schema/token.sql");
const USER_SCHEMA: &str = include_str!("../../schema/user.sql");

/// One pool per partition.
#[derive(Debug, Clone)]
pub struct Pools {
  pub trading: PgPool,
  pub token: PgPool,
  pub user: PgPool,
}

impl Pools {
  pub async fn connect(config: &AppConfig) -> Result<Self, sqlx::Error> {
    let connect = |url: &str| {
      PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect_lazy(url)
    };
    let pools = Pools {
      trading: connect(&config.trading_database_url)?,
      token: connect(&config.token_database_url)?,
      user: connect(&config.user_database_url)?,
    };
    // Fail fast if any partition is unreachable.
    tokio::try_join!(
      sqlx::query("SELECT 1").execute(&pools.trading),
      sqlx::query("SELECT 1").execute(&pools.token),
      sqlx::query("SELECT 1").execute(&pools.user),
    )?;
    info!("Connected to trading, token and user databases.");
    Ok(pools)
  }

  /// Creates missing tables. Statements are idempotent.
  pub async fn apply_schema(&self) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(TRADING_SCHEMA).execute(&self.trading).await?;
    sqlx::raw_sql(TOKEN_SCHEMA).execute(&self.token).await?;
    sqlx::raw_sql(USER_SCHEMA).execute(&self.user).await?;
    info!("Database schema applied.");
    Ok(())
  }

  pub fn registry(&self) -> StoreRegistry {
    let directory = Arc::new(PgDirectory::new(self.user.clone()));
    StoreRegistry::new(
      Arc::new(PgTradingStore::new(self.trading.clone())),
      Arc::new(PgTokenStore::new(self.token.clone())),
      directory.clone(),
      directory,
    )
  }
}

/// Unique violations are lost races; everything else is a backend failure.
pub(crate) fn storage_error(e: sqlx::Error) -> SettleError {
  if let Some(db_err) = e.as_database_error() {
    if db_err.is_unique_violation() {
      return SettleError::conflict(db_err.message().to_string());
    }
  }
  SettleError::from(anyhow::Error::new(e))
}

/// Stored enum text that no longer parses is corrupt data, not a caller error.
pub(crate) fn decode_error(e: impl std::error::Error + Send + Sync + 'static) -> SettleError {
  SettleError::from(anyhow::Error::new(e).context("decoding stored row"))
}

/// `BIGINT` versions are never negative; the ledger starts at 1.
pub(crate) fn version_from_db(raw: i64) -> u64 {
  u64::try_from(raw).unwrap_or_default()
}

pub(crate) fn version_to_db(version: u64) -> i64 {
  i64::try_from(version).unwrap_or(i64::MAX)
}
