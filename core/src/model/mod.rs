// core/src/model/mod.rs

//! Records owned by the three data partitions.
//!
//! Cross-partition references (buyer, seller, item, token owner) are plain
//! string ids; nothing here holds a pointer into another partition.

pub mod actor;
pub mod ledger;
pub mod order;
pub mod payment;

pub use actor::{Actor, Party, Role};
pub use ledger::{CreditOutcome, CreditRequest, TokenLedgerEntry, TokenTransaction};
pub use order::{Order, OrderStatus};
pub use payment::{Payment, PaymentMethod, PaymentStatus};

/// Parse error for the string forms of the status/method enums.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
  pub kind: &'static str,
  pub value: String,
}
