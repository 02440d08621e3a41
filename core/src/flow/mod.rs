// core/src/flow/mod.rs

//! The order state machine.
//!
//! `OrderFlow` is the only component that writes order status. Every
//! operation follows the same shape:
//!  1. Read the order + payment.
//!  2. Check the actor against the transition ([`transitions::authorize`]).
//!  3. Check the transition table ([`transitions::check_state`]).
//!  4. Write order and payment together with a compare-and-set on the status read in 1.
//!  5. Run side effects (rewards) only after the write committed.
//!
//! A failure in 1-4 leaves every partition exactly as it was.

pub mod transitions;

use crate::error::{SettleError, SettleResult};
use crate::gateway::{IntentRequest, PaymentGateway, PaymentIntent};
use crate::model::{Actor, Order, OrderStatus, Payment, PaymentMethod, PaymentStatus};
use crate::reward::{RewardEngine, RewardPolicy};
use crate::slip::{SlipCollector, SlipUpload};
use crate::store::{OrderRecord, StatusTransition, StoreRegistry};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

pub use transitions::Transition;

/// Input of [`OrderFlow::create_order`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
  pub item_id: String,
  pub buyer_id: String,
  pub seller_id: String,
  /// Minor units.
  pub amount: i64,
  pub currency: String,
  pub method: PaymentMethod,
}

/// What the gateway adapter knows about a confirmed provider payment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfirmation {
  pub provider_order_id: Option<String>,
  pub capture_id: Option<String>,
}

#[derive(Clone)]
pub struct OrderFlow {
  stores: StoreRegistry,
  rewards: RewardEngine,
  gateway: Option<Arc<dyn PaymentGateway>>,
  slips: Option<SlipCollector>,
}

impl OrderFlow {
  pub fn new(stores: StoreRegistry, policy: RewardPolicy) -> Self {
    OrderFlow {
      rewards: RewardEngine::new(stores.clone(), policy),
      stores,
      gateway: None,
      slips: None,
    }
  }

  pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
    self.gateway = Some(gateway);
    self
  }

  pub fn with_slips(mut self, slips: SlipCollector) -> Self {
    self.slips = Some(slips);
    self
  }

  pub fn stores(&self) -> &StoreRegistry {
    &self.stores
  }

  pub fn rewards(&self) -> &RewardEngine {
    &self.rewards
  }

  async fn load(&self, order_id: &str) -> SettleResult<OrderRecord> {
    self
      .stores
      .trading
      .find(order_id)
      .await?
      .ok_or_else(|| SettleError::not_found(format!("order {order_id}")))
  }

  fn gateway(&self) -> SettleResult<&Arc<dyn PaymentGateway>> {
    self
      .gateway
      .as_ref()
      .ok_or_else(|| SettleError::validation("no payment gateway is configured"))
  }

  #[instrument(skip(self, new), fields(actor = %actor.user_id, item_id = %new.item_id, method = %new.method))]
  pub async fn create_order(&self, actor: &Actor, new: NewOrder) -> SettleResult<OrderRecord> {
    if new.amount < 0 {
      return Err(SettleError::validation("amount must not be negative"));
    }
    let currency = new.currency.trim().to_ascii_uppercase();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
      return Err(SettleError::validation(format!("invalid currency '{}'", new.currency)));
    }
    if new.buyer_id == new.seller_id {
      return Err(SettleError::validation("buyer and seller must differ"));
    }
    if actor.user_id != new.buyer_id && !actor.is_admin() {
      return Err(SettleError::authorization("orders are created by their buyer"));
    }

    // Fan out to the other partitions; no joins.
    let (item, buyer, seller) = tokio::try_join!(
      self.stores.items.find_item(&new.item_id),
      self.stores.users.find_user(&new.buyer_id),
      self.stores.users.find_user(&new.seller_id),
    )?;
    let item = item.ok_or_else(|| SettleError::validation(format!("item {} does not exist", new.item_id)))?;
    if buyer.is_none() {
      return Err(SettleError::validation(format!("buyer {} does not exist", new.buyer_id)));
    }
    if seller.is_none() {
      return Err(SettleError::validation(format!("seller {} does not exist", new.seller_id)));
    }
    if item.seller_id != new.seller_id {
      return Err(SettleError::validation(format!(
        "item {} is not listed by seller {}",
        item.id, new.seller_id
      )));
    }

    let now = Utc::now();
    let order_id = Uuid::new_v4().to_string();
    let record = OrderRecord {
      order: Order {
        id: order_id.clone(),
        item_id: new.item_id.clone(),
        buyer_id: new.buyer_id.clone(),
        seller_id: new.seller_id.clone(),
        status: OrderStatus::PendingPayment,
        created_at: now,
        updated_at: now,
        is_deleted: false,
      },
      payment: Payment {
        id: Uuid::new_v4().to_string(),
        order_id,
        item_id: new.item_id,
        buyer_id: new.buyer_id,
        seller_id: new.seller_id,
        amount: new.amount,
        currency,
        method: new.method,
        status: PaymentStatus::Pending,
        paid_at: None,
        slip_image_url: None,
        provider_order_id: None,
        provider_capture_id: None,
        buyer_token_rewarded: false,
        seller_token_rewarded: false,
        created_at: now,
        updated_at: now,
      },
    };
    self.stores.trading.insert(&record).await?;
    info!(order_id = %record.order.id, amount = record.payment.amount, "Order created, payment pending.");
    Ok(record)
  }

  #[instrument(skip(self), fields(actor = %actor.user_id))]
  pub async fn get_order(&self, order_id: &str, actor: &Actor) -> SettleResult<OrderRecord> {
    let record = self.load(order_id).await?;
    let order = &record.order;
    if !(order.is_buyer(&actor.user_id) || order.is_seller(&actor.user_id) || actor.is_admin()) {
      return Err(SettleError::authorization(format!("user {} is not a party to order {order_id}", actor.user_id)));
    }
    Ok(record)
  }

  pub async fn list_orders(&self, actor: &Actor) -> SettleResult<Vec<Order>> {
    self.stores.trading.list_for_user(&actor.user_id).await
  }

  /// Attaches an already-stored proof reference and moves the order to `PAID_PENDING_VERIFY`.
  #[instrument(skip(self), fields(actor = %actor.user_id))]
  pub async fn submit_proof(&self, order_id: &str, actor: &Actor, proof_ref: &str) -> SettleResult<OrderRecord> {
    if proof_ref.trim().is_empty() {
      return Err(SettleError::validation("proof reference is empty"));
    }
    let record = self.load(order_id).await?;
    transitions::authorize(Transition::SubmitProof, actor, &record.order)?;
    transitions::check_state(Transition::SubmitProof, &record)?;

    let t = StatusTransition::new(order_id, record.order.status, Transition::SubmitProof.target(), Utc::now())
      .with_slip(proof_ref);
    let updated = self.stores.trading.apply_transition(&t).await?;
    info!("Proof submitted; waiting for seller verification.");
    Ok(updated)
  }

  /// Validates and stores an uploaded slip, then submits it as proof.
  /// State and role are checked before anything is written to disk.
  #[instrument(skip(self, upload), fields(actor = %actor.user_id))]
  pub async fn submit_slip(&self, order_id: &str, actor: &Actor, upload: &SlipUpload) -> SettleResult<OrderRecord> {
    let slips = self
      .slips
      .as_ref()
      .ok_or_else(|| SettleError::validation("slip uploads are not configured"))?;
    let record = self.load(order_id).await?;
    transitions::authorize(Transition::SubmitProof, actor, &record.order)?;
    transitions::check_state(Transition::SubmitProof, &record)?;

    let stored = slips.store(upload).await?;
    match self.submit_proof(order_id, actor, &stored.url).await {
      Ok(updated) => Ok(updated),
      Err(e) => {
        slips.discard(&stored).await;
        Err(e)
      }
    }
  }

  /// Seller (or admin) confirms a manual payment. Rewards both parties once.
  /// A failed reward step is returned as the error while the order stays
  /// verified; `settle_rewards` completes it.
  #[instrument(skip(self), fields(actor = %actor.user_id))]
  pub async fn verify(&self, order_id: &str, actor: &Actor) -> SettleResult<OrderRecord> {
    let record = self.load(order_id).await?;
    transitions::authorize(Transition::Verify, actor, &record.order)?;
    transitions::check_state(Transition::Verify, &record)?;

    let now = Utc::now();
    let t = StatusTransition::new(order_id, record.order.status, Transition::Verify.target(), now)
      .with_payment_status(PaymentStatus::Paid)
      .with_paid_at(now);
    let updated = self.stores.trading.apply_transition(&t).await?;
    info!("Payment verified by {}.", actor.user_id);
    self.settle(updated).await
  }

  /// Called after the gateway adapter verified a provider notification.
  /// Replays succeed without crediting again.
  #[instrument(skip(self, confirmation), fields(capture_id = ?confirmation.capture_id))]
  pub async fn confirm_gateway_payment(
    &self,
    order_id: &str,
    confirmation: &GatewayConfirmation,
  ) -> SettleResult<OrderRecord> {
    let record = self.load(order_id).await?;
    if record.payment.status == PaymentStatus::Paid {
      info!("Payment already confirmed; replay is a no-op.");
      // Also completes a reward step interrupted after an earlier confirmation.
      return self.settle(record).await;
    }
    check_confirmable(&record, confirmation)?;

    let now = Utc::now();
    let t = StatusTransition::new(order_id, record.order.status, Transition::ConfirmGateway.target(), now)
      .with_payment_status(PaymentStatus::Paid)
      .with_paid_at(now)
      .with_capture(confirmation.capture_id.clone());
    match self.stores.trading.apply_transition(&t).await {
      Ok(updated) => {
        info!("Gateway payment confirmed.");
        self.settle(updated).await
      }
      Err(SettleError::Conflict(reason)) => {
        // A concurrent delivery may have won; that is still a success for this one.
        let current = self.load(order_id).await?;
        if current.payment.status == PaymentStatus::Paid {
          info!(%reason, "Concurrent confirmation already applied.");
          Ok(current)
        } else {
          Err(SettleError::Conflict(reason))
        }
      }
      Err(other) => Err(other),
    }
  }

  #[instrument(skip(self), fields(actor = %actor.user_id))]
  pub async fn complete(&self, order_id: &str, actor: &Actor) -> SettleResult<OrderRecord> {
    let record = self.load(order_id).await?;
    transitions::authorize(Transition::Complete, actor, &record.order)?;
    transitions::check_state(Transition::Complete, &record)?;
    let t = StatusTransition::new(order_id, record.order.status, Transition::Complete.target(), Utc::now());
    let updated = self.stores.trading.apply_transition(&t).await?;
    info!("Order fulfilled.");
    Ok(updated)
  }

  /// Cancels from any non-terminal state. A pending payment becomes `failed`;
  /// the slip reference stays for audit. No reward is ever issued afterwards.
  #[instrument(skip(self), fields(actor = %actor.user_id))]
  pub async fn cancel(&self, order_id: &str, actor: &Actor) -> SettleResult<OrderRecord> {
    let record = self.load(order_id).await?;
    transitions::authorize(Transition::Cancel, actor, &record.order)?;
    transitions::check_state(Transition::Cancel, &record)?;
    let mut t = StatusTransition::new(order_id, record.order.status, Transition::Cancel.target(), Utc::now());
    if record.payment.status == PaymentStatus::Pending {
      t = t.with_payment_status(PaymentStatus::Failed);
    }
    let updated = self.stores.trading.apply_transition(&t).await?;
    info!(from = %record.order.status, "Order cancelled.");
    Ok(updated)
  }

  /// Admin refund. Captured gateway payments are refunded at the provider
  /// first; a provider failure leaves the order untouched. A gateway payment
  /// without a capture is refused. Issued token rewards are not reversed.
  #[instrument(skip(self), fields(actor = %actor.user_id))]
  pub async fn refund(&self, order_id: &str, actor: &Actor) -> SettleResult<OrderRecord> {
    let record = self.load(order_id).await?;
    transitions::authorize(Transition::Refund, actor, &record.order)?;
    transitions::check_state(Transition::Refund, &record)?;

    match record.payment.provider_capture_id.as_deref() {
      Some(capture_id) => {
        let refund = self.gateway()?.refund(capture_id).await?;
        info!(refund_id = %refund.refund_id, status = %refund.status, "Provider refund issued.");
      }
      None if record.payment.method.is_gateway() => {
        return Err(SettleError::validation(format!(
          "{} payment for order {order_id} has no provider capture to refund",
          record.payment.method
        )));
      }
      None => {}
    }

    let t = StatusTransition::new(order_id, record.order.status, Transition::Refund.target(), Utc::now())
      .with_payment_status(PaymentStatus::Refunded);
    match self.stores.trading.apply_transition(&t).await {
      Ok(updated) => {
        info!("Order refunded.");
        Ok(updated)
      }
      Err(e) => {
        if record.payment.provider_capture_id.is_some() {
          error!(error = %e, "Provider refund succeeded but the order could not be marked refunded.");
        }
        Err(e)
      }
    }
  }

  /// Buyer asks the provider for a payment object for a gateway-method order.
  #[instrument(skip(self), fields(actor = %actor.user_id))]
  pub async fn start_gateway_checkout(&self, order_id: &str, actor: &Actor) -> SettleResult<PaymentIntent> {
    let record = self.load(order_id).await?;
    if !record.order.is_buyer(&actor.user_id) {
      return Err(SettleError::authorization("only the buyer can pay for an order"));
    }
    if record.order.is_deleted
      || record.order.status != OrderStatus::PendingPayment
      || !record.payment.method.is_gateway()
    {
      return Err(SettleError::invalid_state(order_id, "start_gateway_checkout", record.order.status));
    }

    let request = IntentRequest {
      amount: record.payment.amount,
      currency: record.payment.currency.clone(),
      order_id: order_id.to_string(),
      description: format!("Marketplace order {order_id} (item {})", record.order.item_id),
    };
    let intent = self.gateway()?.create_intent(&request).await?;
    self
      .stores
      .trading
      .attach_provider_order(order_id, OrderStatus::PendingPayment, &intent.provider_order_id, Utc::now())
      .await?;
    Ok(intent)
  }

  /// Admin-only soft delete of a finished order.
  #[instrument(skip(self), fields(actor = %actor.user_id))]
  pub async fn soft_delete(&self, order_id: &str, actor: &Actor) -> SettleResult<OrderRecord> {
    if !actor.is_admin() {
      return Err(SettleError::authorization("only admins can delete orders"));
    }
    let record = self.load(order_id).await?;
    if record.order.is_deleted || !record.order.status.is_terminal() {
      return Err(SettleError::invalid_state(order_id, "soft_delete", record.order.status));
    }
    self.stores.trading.soft_delete(order_id, record.order.status, Utc::now()).await
  }

  /// Admin repair: re-runs the idempotent reward step for a paid order.
  #[instrument(skip(self), fields(actor = %actor.user_id))]
  pub async fn settle_rewards(&self, order_id: &str, actor: &Actor) -> SettleResult<OrderRecord> {
    if !actor.is_admin() {
      return Err(SettleError::authorization("only admins can settle rewards"));
    }
    let record = self.load(order_id).await?;
    if record.payment.status != PaymentStatus::Paid {
      return Err(SettleError::invalid_state(order_id, "settle_rewards", record.payment.status));
    }
    self.settle(record).await
  }

  pub async fn token_balance(&self, owner_id: &str) -> SettleResult<i64> {
    Ok(self.stores.tokens.entry(owner_id).await?.map(|e| e.balance).unwrap_or(0))
  }

  /// Reward side effect of a committed paid transition. A reward failure does
  /// not undo the transition but is returned to the caller; the flags stay
  /// false until a provider redelivery or `settle_rewards` finishes the job.
  async fn settle(&self, record: OrderRecord) -> SettleResult<OrderRecord> {
    let order_id = record.order.id.clone();
    if record.order.status == OrderStatus::Cancelled {
      warn!(order_id = %order_id, "Paid payment on a cancelled order; no reward issued.");
      return Ok(record);
    }
    match self.rewards.reward_both(&record.payment).await {
      Ok(outcomes) => info!(order_id = %order_id, ?outcomes, "Reward step finished."),
      Err(e) => {
        error!(order_id = %order_id, error = %e, "Reward step failed; order stays paid, rewards pending.");
        return Err(e);
      }
    }
    self.load(&order_id).await
  }
}

/// Whether `record` can take the provider payment described by `confirmation`:
/// the provider order must be the one started for this order, and the
/// transition table must allow the confirmation.
pub(crate) fn check_confirmable(record: &OrderRecord, confirmation: &GatewayConfirmation) -> SettleResult<()> {
  if let (Some(expected), Some(got)) = (&record.payment.provider_order_id, &confirmation.provider_order_id) {
    if expected != got {
      return Err(SettleError::validation(format!(
        "provider order {got} does not belong to order {}",
        record.order.id
      )));
    }
  }
  transitions::check_state(Transition::ConfirmGateway, record)
}

impl std::fmt::Debug for OrderFlow {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("OrderFlow")
      .field("policy", self.rewards.policy())
      .field("gateway", &self.gateway.is_some())
      .field("slips", &self.slips)
      .finish()
  }
}
