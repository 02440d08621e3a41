// tests/authorization_tests.rs
mod common;
use common::*;
use tradeflow::{Actor, PaymentMethod, SettleError};

fn is_auth_error<T: std::fmt::Debug>(result: Result<T, SettleError>) -> bool {
  matches!(result, Err(SettleError::Authorization(_)))
}

#[tokio::test]
async fn test_buyer_cannot_verify_own_order() {
  let fx = fixture();
  let waiting = fx.awaiting_verification().await;

  assert!(is_auth_error(fx.flow.verify(&waiting.order.id, &buyer()).await));
  assert_eq!(fx.current(&waiting.order.id).await, waiting);
  assert_eq!(fx.balance(BUYER).await, 0);
}

#[tokio::test]
async fn test_outsider_cannot_touch_an_order() {
  let fx = fixture();
  let waiting = fx.awaiting_verification().await;
  let id = &waiting.order.id;

  assert!(is_auth_error(fx.flow.verify(id, &other()).await));
  assert!(is_auth_error(fx.flow.cancel(id, &other()).await));
  assert!(is_auth_error(fx.flow.complete(id, &other()).await));
  assert!(is_auth_error(fx.flow.submit_proof(id, &other(), "/slips/x.png").await));
}

#[tokio::test]
async fn test_only_admin_refunds() {
  let fx = fixture();
  let waiting = fx.awaiting_verification().await;
  fx.flow.verify(&waiting.order.id, &seller()).await.unwrap();

  assert!(is_auth_error(fx.flow.refund(&waiting.order.id, &seller()).await));
  assert!(is_auth_error(fx.flow.refund(&waiting.order.id, &buyer()).await));
  assert!(fx.flow.refund(&waiting.order.id, &admin()).await.is_ok());
}

#[tokio::test]
async fn test_admin_cannot_complete_for_the_parties() {
  let fx = fixture();
  let waiting = fx.awaiting_verification().await;
  fx.flow.verify(&waiting.order.id, &seller()).await.unwrap();

  assert!(is_auth_error(fx.flow.complete(&waiting.order.id, &admin()).await));
  assert!(fx.flow.complete(&waiting.order.id, &seller()).await.is_ok());
}

#[tokio::test]
async fn test_orders_are_created_by_their_buyer() {
  let fx = fixture();
  let result = fx.flow.create_order(&Actor::member(OTHER), new_order(100, PaymentMethod::Cash)).await;
  assert!(is_auth_error(result));
  assert!(fx.flow.create_order(&admin(), new_order(100, PaymentMethod::Cash)).await.is_ok());
}

#[tokio::test]
async fn test_reward_repair_is_admin_only() {
  let fx = fixture();
  let waiting = fx.awaiting_verification().await;
  fx.flow.verify(&waiting.order.id, &seller()).await.unwrap();
  assert!(is_auth_error(fx.flow.settle_rewards(&waiting.order.id, &seller()).await));
}
