// core/src/model/ledger.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One party's token balance in the token partition.
///
/// `version` increases on every write; writers pass the version they read
/// and the store rejects the write if it moved (see [`CreditRequest`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenLedgerEntry {
  pub owner_id: String,
  pub balance: i64,
  pub version: u64,
  pub updated_at: DateTime<Utc>,
}

/// Journal row for one applied credit. `idempotency_key` is unique per store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransaction {
  pub idempotency_key: String,
  pub owner_id: String,
  pub amount: i64,
  pub reason: String,
  pub created_at: DateTime<Utc>,
}

/// Additive ledger write, conditional on the entry version the caller read.
/// `expected_version == None` means "the entry must not exist yet".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditRequest {
  pub owner_id: String,
  pub amount: i64,
  pub expected_version: Option<u64>,
  pub idempotency_key: String,
  pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditOutcome {
  Applied(TokenLedgerEntry),
  /// The idempotency key was already journaled; nothing changed.
  AlreadyApplied,
}
