// src/lib.rs

//! Tradeflow: order and payment settlement for a peer-to-peer marketplace.
//!
//! Tradeflow owns the part of the marketplace where a bug costs money:
//!  - An order state machine ([`OrderFlow`]) that is the only writer of
//!    order status and applies every transition as a compare-and-set.
//!  - A reward engine that credits loyalty tokens to buyer and seller at most
//!    once per order, however often the trigger fires.
//!  - A payment gateway adapter (PayPal REST) with webhook signature checks.
//!  - A slip collector for manual transfer proofs.
//!  - A content-addressed TTL/LRU cache for price advice.
//!
//! Storage is split into three partitions (trading, token, user/item
//! directory) behind the traits in [`store`]; they are never joined.

pub mod advice;
pub mod cache;
pub mod error;
pub mod flow;
pub mod gateway;
pub mod model;
pub mod reward;
pub mod slip;
pub mod store;

// --- Re-exports for the Public API ---

pub use crate::error::{SettleError, SettleResult};

pub use crate::model::{
  Actor, Order, OrderStatus, Party, Payment, PaymentMethod, PaymentStatus, Role, TokenLedgerEntry,
};

pub use crate::flow::{GatewayConfirmation, NewOrder, OrderFlow, Transition};
pub use crate::reward::{RewardEngine, RewardOutcome, RewardPolicy};

pub use crate::gateway::{
  NotificationHeaders, NotificationOutcome, NotificationProcessor, PayPalConfig, PayPalGateway, PaymentGateway,
};

pub use crate::slip::{SlipCollector, SlipUpload, StoredSlip};

pub use crate::store::memory::MemoryStores;
pub use crate::store::{OrderRecord, StoreRegistry};

pub use crate::advice::{CachedAdvisor, PriceAdvice, PriceAdvisor, PriceQuery};
pub use crate::cache::ContentCache;
