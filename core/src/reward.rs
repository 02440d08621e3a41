// core/src/reward.rs

//! Token rewards for settled trades.
//!
//! A reward is two writes in two partitions: an additive credit in the token
//! ledger and the per-party flag on the payment. The credit carries the
//! idempotency key `reward:{order_id}:{party}`, so the ledger can apply it at
//! most once no matter how often the engine runs. The flag is flipped only
//! after the credit is durable. If the process dies in between, the next run
//! (webhook redelivery, `settle_rewards`) sees the flag still false, gets
//! `AlreadyApplied` back from the ledger and flips the flag without crediting
//! again.

use crate::error::{SettleError, SettleResult};
use crate::model::{CreditOutcome, CreditRequest, Party, Payment, PaymentStatus};
use crate::store::StoreRegistry;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// How many versioned ledger writes to attempt before giving up with `Conflict`.
const MAX_LEDGER_ATTEMPTS: usize = 8;

/// Token amounts per settled trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardPolicy {
  pub buyer_tokens: i64,
  pub seller_tokens: i64,
  /// One extra token per `per_amount_divisor` minor units of the payment. 0 disables it.
  pub per_amount_divisor: i64,
}

impl Default for RewardPolicy {
  fn default() -> Self {
    RewardPolicy {
      buyer_tokens: 10,
      seller_tokens: 10,
      per_amount_divisor: 0,
    }
  }
}

impl RewardPolicy {
  pub fn fixed(tokens: i64) -> Self {
    RewardPolicy {
      buyer_tokens: tokens,
      seller_tokens: tokens,
      per_amount_divisor: 0,
    }
  }

  pub fn tokens_for(&self, payment: &Payment, party: Party) -> i64 {
    let base = match party {
      Party::Buyer => self.buyer_tokens,
      Party::Seller => self.seller_tokens,
    };
    let bonus = if self.per_amount_divisor > 0 {
      payment.amount / self.per_amount_divisor
    } else {
      0
    };
    (base + bonus).max(0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardOutcome {
  /// This call credited the party and flipped the flag.
  Credited { tokens: i64 },
  /// The flag was already set; nothing was written.
  AlreadyRewarded,
  /// The ledger already held the credit (earlier interrupted run); this call only flipped the flag.
  FlagRepaired,
}

pub fn reward_key(order_id: &str, party: Party) -> String {
  format!("reward:{order_id}:{party}")
}

#[derive(Debug, Clone)]
pub struct RewardEngine {
  stores: StoreRegistry,
  policy: RewardPolicy,
}

impl RewardEngine {
  pub fn new(stores: StoreRegistry, policy: RewardPolicy) -> Self {
    RewardEngine { stores, policy }
  }

  pub fn policy(&self) -> &RewardPolicy {
    &self.policy
  }

  /// Credits `party` for `payment` unless its flag says it already happened.
  /// Safe to call any number of times, concurrently.
  #[instrument(skip(self, payment), fields(order_id = %payment.order_id, party = %party))]
  pub async fn maybe_reward_party(&self, payment: &Payment, party: Party) -> SettleResult<RewardOutcome> {
    if payment.is_rewarded(party) {
      debug!("Reward flag already set, skipping.");
      return Ok(RewardOutcome::AlreadyRewarded);
    }
    if payment.status != PaymentStatus::Paid {
      return Err(SettleError::invalid_state(&payment.order_id, "reward", payment.status));
    }

    let owner_id = payment.party_id(party).to_string();
    let tokens = self.policy.tokens_for(payment, party);
    let key = reward_key(&payment.order_id, party);

    let applied = self.credit_with_retry(&owner_id, tokens, &key).await?;

    let flipped = self.stores.trading.mark_rewarded(&payment.order_id, party, Utc::now()).await?;
    match (applied, flipped) {
      (true, true) => {
        info!(owner_id = %owner_id, tokens, "Token reward credited.");
        Ok(RewardOutcome::Credited { tokens })
      }
      (false, true) => {
        warn!(owner_id = %owner_id, "Ledger already held this reward; flag repaired.");
        Ok(RewardOutcome::FlagRepaired)
      }
      // Another caller flipped the flag first. Our credit, if any, was the only one
      // because the ledger key is shared.
      (_, false) => Ok(RewardOutcome::AlreadyRewarded),
    }
  }

  /// Runs the reward step for both parties.
  pub async fn reward_both(&self, payment: &Payment) -> SettleResult<[RewardOutcome; 2]> {
    let buyer = self.maybe_reward_party(payment, Party::Buyer).await?;
    let seller = self.maybe_reward_party(payment, Party::Seller).await?;
    Ok([buyer, seller])
  }

  /// Read-compute-conditional-write on the party's ledger entry.
  /// Returns `true` if this call applied the credit, `false` if the key was already journaled.
  async fn credit_with_retry(&self, owner_id: &str, tokens: i64, key: &str) -> SettleResult<bool> {
    for attempt in 1..=MAX_LEDGER_ATTEMPTS {
      let current = self.stores.tokens.entry(owner_id).await?;
      let request = CreditRequest {
        owner_id: owner_id.to_string(),
        amount: tokens,
        expected_version: current.map(|e| e.version),
        idempotency_key: key.to_string(),
        reason: "trade_reward".to_string(),
      };
      match self.stores.tokens.apply_credit(&request).await {
        Ok(CreditOutcome::Applied(entry)) => {
          debug!(balance = entry.balance, version = entry.version, "Ledger credit applied.");
          return Ok(true);
        }
        Ok(CreditOutcome::AlreadyApplied) => return Ok(false),
        Err(SettleError::Conflict(reason)) => {
          debug!(attempt, %reason, "Ledger version moved, re-reading.");
          tokio::task::yield_now().await;
        }
        Err(other) => return Err(other),
      }
    }
    Err(SettleError::conflict(format!(
      "ledger entry for {owner_id} kept changing after {MAX_LEDGER_ATTEMPTS} attempts"
    )))
  }
}
