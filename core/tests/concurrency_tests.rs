// tests/concurrency_tests.rs
mod common;
use common::*;
use chrono::Utc;
use tradeflow::store::{StatusTransition, TradingStore};
use tradeflow::{GatewayConfirmation, OrderStatus, Party, PaymentMethod, PaymentStatus, RewardOutcome, SettleError};

const RACERS: usize = 16;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_verify_applies_exactly_once() {
  let fx = fixture();
  let waiting = fx.awaiting_verification().await;

  let mut handles = Vec::new();
  for _ in 0..RACERS {
    let flow = fx.flow.clone();
    let order_id = waiting.order.id.clone();
    handles.push(tokio::spawn(async move { flow.verify(&order_id, &seller()).await }));
  }

  let mut wins = 0;
  for handle in handles {
    match handle.await.expect("task panicked") {
      Ok(record) => {
        assert_eq!(record.order.status, OrderStatus::PaidVerified);
        wins += 1;
      }
      Err(SettleError::InvalidState { .. }) | Err(SettleError::Conflict(_)) => {}
      Err(other) => panic!("unexpected error: {other}"),
    }
  }
  assert_eq!(wins, 1);
  assert_eq!(fx.balance(BUYER).await, REWARD_TOKENS);
  assert_eq!(fx.balance(SELLER).await, REWARD_TOKENS);
  assert_eq!(fx.stores.tokens.journal_len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_gateway_confirmations_all_succeed_and_credit_once() {
  let fx = fixture();
  let record = fx.create(25_000, PaymentMethod::Paypal).await;
  let intent = fx.flow.start_gateway_checkout(&record.order.id, &buyer()).await.unwrap();
  let confirmation = GatewayConfirmation {
    provider_order_id: Some(intent.provider_order_id),
    capture_id: Some("CAP-RACE".to_string()),
  };

  let mut handles = Vec::new();
  for _ in 0..RACERS {
    let flow = fx.flow.clone();
    let order_id = record.order.id.clone();
    let confirmation = confirmation.clone();
    handles.push(tokio::spawn(async move {
      flow.confirm_gateway_payment(&order_id, &confirmation).await
    }));
  }
  for handle in handles {
    let confirmed = handle.await.expect("task panicked").expect("confirmation is idempotent");
    assert_eq!(confirmed.order.status, OrderStatus::PaidVerified);
  }

  let current = fx.current(&record.order.id).await;
  assert!(current.payment.buyer_token_rewarded);
  assert!(current.payment.seller_token_rewarded);
  assert_eq!(fx.balance(BUYER).await, REWARD_TOKENS);
  assert_eq!(fx.balance(SELLER).await, REWARD_TOKENS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reward_calls_for_one_party_credit_once() {
  let fx = fixture();
  let waiting = fx.awaiting_verification().await;
  // Mark paid directly in the store, skipping the reward step.
  let now = Utc::now();
  let transition = StatusTransition::new(
    &waiting.order.id,
    OrderStatus::PaidPendingVerify,
    OrderStatus::PaidVerified,
    now,
  )
  .with_payment_status(PaymentStatus::Paid)
  .with_paid_at(now);
  let paid = fx.stores.trading.apply_transition(&transition).await.unwrap().payment;
  assert!(!paid.buyer_token_rewarded);

  let mut handles = Vec::new();
  for _ in 0..RACERS {
    let rewards = fx.flow.rewards().clone();
    let payment = paid.clone();
    handles.push(tokio::spawn(async move {
      rewards.maybe_reward_party(&payment, Party::Buyer).await
    }));
  }
  let mut credited = 0;
  for handle in handles {
    match handle.await.expect("task panicked").expect("reward call") {
      RewardOutcome::Credited { tokens } => {
        assert_eq!(tokens, REWARD_TOKENS);
        credited += 1;
      }
      RewardOutcome::AlreadyRewarded | RewardOutcome::FlagRepaired => {}
    }
  }
  assert_eq!(credited, 1);
  assert_eq!(fx.balance(BUYER).await, REWARD_TOKENS);
  assert_eq!(fx.balance(SELLER).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rewards_for_many_orders_accumulate_on_one_ledger_entry() {
  let fx = fixture();
  let orders = 6;
  let mut ids = Vec::new();
  for _ in 0..orders {
    ids.push(fx.awaiting_verification().await.order.id);
  }

  let mut handles = Vec::new();
  for id in ids.clone() {
    let flow = fx.flow.clone();
    handles.push(tokio::spawn(async move { flow.verify(&id, &seller()).await }));
  }
  for handle in handles {
    handle.await.expect("task panicked").expect("verify");
  }
  // Repair pass is a no-op when everything landed, and finishes the job otherwise.
  for id in &ids {
    fx.flow.settle_rewards(id, &admin()).await.unwrap();
  }

  assert_eq!(fx.balance(BUYER).await, REWARD_TOKENS * orders as i64);
  assert_eq!(fx.balance(SELLER).await, REWARD_TOKENS * orders as i64);
  assert_eq!(fx.stores.tokens.journal_len(), 2 * orders);
}
