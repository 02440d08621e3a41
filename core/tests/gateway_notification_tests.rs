// tests/gateway_notification_tests.rs
mod common;
use common::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tradeflow::{
  GatewayConfirmation, NotificationHeaders, NotificationOutcome, NotificationProcessor, OrderStatus, PaymentMethod, PaymentStatus,
  SettleError,
};

fn processor(fx: &Fixture) -> NotificationProcessor {
  NotificationProcessor::new(fx.gateway.clone(), Arc::clone(&fx.flow))
}

fn headers() -> NotificationHeaders {
  NotificationHeaders::default()
}

async fn checkout(fx: &Fixture) -> (String, String) {
  let record = fx.create(25_000, PaymentMethod::Paypal).await;
  let intent = fx.flow.start_gateway_checkout(&record.order.id, &buyer()).await.unwrap();
  (record.order.id, intent.provider_order_id)
}

#[tokio::test]
async fn test_checkout_attaches_provider_order() {
  let fx = fixture();
  let (order_id, provider_order_id) = checkout(&fx).await;

  let current = fx.current(&order_id).await;
  assert_eq!(current.payment.provider_order_id.as_deref(), Some(provider_order_id.as_str()));
  assert_eq!(current.order.status, OrderStatus::PendingPayment);
  assert_eq!(fx.gateway.intents_created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_checkout_rejects_manual_orders_and_non_buyers() {
  let fx = fixture();
  let manual = fx.create(1_000, PaymentMethod::Cash).await;
  assert!(matches!(
    fx.flow.start_gateway_checkout(&manual.order.id, &buyer()).await,
    Err(SettleError::InvalidState { .. })
  ));

  let online = fx.create(1_000, PaymentMethod::Paypal).await;
  assert!(matches!(
    fx.flow.start_gateway_checkout(&online.order.id, &seller()).await,
    Err(SettleError::Authorization(_))
  ));
  assert_eq!(fx.gateway.intents_created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_capture_webhook_delivered_twice_rewards_once() {
  let fx = fixture();
  let (order_id, provider_order_id) = checkout(&fx).await;
  let body = capture_completed(&order_id, &provider_order_id, "CAP-77");
  let processor = processor(&fx);

  let first = processor.handle(&headers(), &body).await.unwrap();
  let record = match first {
    NotificationOutcome::Settled(record) => record,
    other => panic!("expected Settled, got {other:?}"),
  };
  assert_eq!(record.order.status, OrderStatus::PaidVerified);
  assert_eq!(record.payment.status, PaymentStatus::Paid);
  assert_eq!(record.payment.provider_capture_id.as_deref(), Some("CAP-77"));
  let paid_at = record.payment.paid_at;
  assert!(paid_at.is_some());

  let second = processor.handle(&headers(), &body).await.unwrap();
  let replayed = match second {
    NotificationOutcome::Settled(record) => record,
    other => panic!("expected Settled, got {other:?}"),
  };
  assert_eq!(replayed.payment.paid_at, paid_at);
  assert_eq!(fx.balance(BUYER).await, REWARD_TOKENS);
  assert_eq!(fx.balance(SELLER).await, REWARD_TOKENS);
  assert_eq!(fx.stores.tokens.journal_len(), 2);
}

#[tokio::test]
async fn test_approval_webhook_captures_then_confirms() {
  let fx = fixture();
  let (order_id, provider_order_id) = checkout(&fx).await;
  let processor = processor(&fx);
  let body = order_approved(&order_id, &provider_order_id);

  let outcome = processor.handle(&headers(), &body).await.unwrap();
  assert!(matches!(outcome, NotificationOutcome::Settled(_)));
  assert_eq!(fx.gateway.capture_count(), 1);
  let current = fx.current(&order_id).await;
  assert_eq!(current.payment.provider_capture_id.as_deref(), Some("CAP-0"));

  // A replayed approval must not capture again.
  processor.handle(&headers(), &body).await.unwrap();
  assert_eq!(fx.gateway.capture_count(), 1);
}

#[tokio::test]
async fn test_bad_signature_is_discarded_without_changes() {
  let fx = fixture();
  let (order_id, provider_order_id) = checkout(&fx).await;
  let before = fx.current(&order_id).await;
  fx.gateway.reject_signatures.store(true, Ordering::SeqCst);

  let outcome = processor(&fx)
    .handle(&headers(), &capture_completed(&order_id, &provider_order_id, "CAP-1"))
    .await
    .unwrap();
  assert_eq!(outcome, NotificationOutcome::Discarded);
  assert_eq!(fx.current(&order_id).await, before);
}

#[tokio::test]
async fn test_unhandled_event_is_ignored() {
  let fx = fixture();
  let body = br#"{"event_type":"CUSTOMER.DISPUTE.CREATED","resource":{}}"#;
  let outcome = processor(&fx).handle(&headers(), body).await.unwrap();
  assert_eq!(
    outcome,
    NotificationOutcome::Ignored {
      event_type: "CUSTOMER.DISPUTE.CREATED".to_string()
    }
  );
}

#[tokio::test]
async fn test_payment_on_cancelled_order_is_rejected() {
  let fx = fixture();
  let (order_id, provider_order_id) = checkout(&fx).await;
  fx.flow.cancel(&order_id, &buyer()).await.unwrap();

  let outcome = processor(&fx)
    .handle(&headers(), &capture_completed(&order_id, &provider_order_id, "CAP-9"))
    .await
    .unwrap();
  assert!(matches!(outcome, NotificationOutcome::Rejected { .. }));
  let current = fx.current(&order_id).await;
  assert_eq!(current.order.status, OrderStatus::Cancelled);
  assert_eq!(fx.balance(BUYER).await, 0);
}

#[tokio::test]
async fn test_foreign_provider_order_is_rejected() {
  let fx = fixture();
  let (order_id, _) = checkout(&fx).await;
  let outcome = processor(&fx)
    .handle(&headers(), &capture_completed(&order_id, "PP-somebody-else", "CAP-2"))
    .await
    .unwrap();
  assert!(matches!(outcome, NotificationOutcome::Rejected { .. }));
  assert_eq!(fx.current(&order_id).await.order.status, OrderStatus::PendingPayment);
}

#[tokio::test]
async fn test_refund_of_gateway_payment_goes_to_provider_first() {
  let fx = fixture();
  let (order_id, provider_order_id) = checkout(&fx).await;
  processor(&fx)
    .handle(&headers(), &capture_completed(&order_id, &provider_order_id, "CAP-5"))
    .await
    .unwrap();

  fx.gateway.fail_refunds.store(true, Ordering::SeqCst);
  let failed = fx.flow.refund(&order_id, &admin()).await;
  assert!(matches!(failed, Err(SettleError::Upstream { status: Some(503), .. })));
  assert_eq!(fx.current(&order_id).await.order.status, OrderStatus::PaidVerified);

  fx.gateway.fail_refunds.store(false, Ordering::SeqCst);
  let refunded = fx.flow.refund(&order_id, &admin()).await.unwrap();
  assert_eq!(refunded.order.status, OrderStatus::Refunded);
  assert_eq!(*fx.gateway.refunds.lock(), vec!["CAP-5".to_string()]);
}

#[tokio::test]
async fn test_approval_for_cancelled_order_is_rejected_without_capture() {
  let fx = fixture();
  let (order_id, provider_order_id) = checkout(&fx).await;
  fx.flow.cancel(&order_id, &buyer()).await.unwrap();

  let outcome = processor(&fx)
    .handle(&headers(), &order_approved(&order_id, &provider_order_id))
    .await
    .unwrap();
  assert!(matches!(outcome, NotificationOutcome::Rejected { .. }));
  assert_eq!(fx.gateway.capture_count(), 0);
  assert!(fx.gateway.refunds.lock().is_empty());
  let current = fx.current(&order_id).await;
  assert_eq!(current.order.status, OrderStatus::Cancelled);
  assert_eq!(current.payment.status, PaymentStatus::Failed);
}

#[tokio::test]
async fn test_approval_for_foreign_provider_order_is_rejected_without_capture() {
  let fx = fixture();
  let (order_id, _) = checkout(&fx).await;

  let outcome = processor(&fx)
    .handle(&headers(), &order_approved(&order_id, "PP-somebody-else"))
    .await
    .unwrap();
  assert!(matches!(outcome, NotificationOutcome::Rejected { .. }));
  assert_eq!(fx.gateway.capture_count(), 0);
  assert_eq!(fx.current(&order_id).await.order.status, OrderStatus::PendingPayment);
}

#[tokio::test]
async fn test_approval_before_checkout_is_rejected_without_capture() {
  let fx = fixture();
  let record = fx.create(25_000, PaymentMethod::Paypal).await;

  let outcome = processor(&fx)
    .handle(&headers(), &order_approved(&record.order.id, "PP-unknown"))
    .await
    .unwrap();
  assert!(matches!(outcome, NotificationOutcome::Rejected { .. }));
  assert_eq!(fx.gateway.capture_count(), 0);
}

#[tokio::test]
async fn test_reward_failure_fails_delivery_and_redelivery_finishes_it() {
  let fx = fixture();
  let (order_id, provider_order_id) = checkout(&fx).await;
  let body = capture_completed(&order_id, &provider_order_id, "CAP-11");
  let processor = processor(&fx);

  fx.ledger.fail_credits.store(true, Ordering::SeqCst);
  let failed = processor.handle(&headers(), &body).await;
  let err = match failed {
    Err(e) => e,
    Ok(outcome) => panic!("expected an error, got {outcome:?}"),
  };
  assert!(matches!(err, SettleError::Storage { .. }));
  assert!(err.is_retryable());

  // The payment itself is recorded; only the rewards are pending.
  let pending = fx.current(&order_id).await;
  assert_eq!(pending.order.status, OrderStatus::PaidVerified);
  assert_eq!(pending.payment.provider_capture_id.as_deref(), Some("CAP-11"));
  assert!(!pending.payment.buyer_token_rewarded);
  assert!(!pending.payment.seller_token_rewarded);
  assert_eq!(fx.balance(BUYER).await, 0);

  fx.ledger.fail_credits.store(false, Ordering::SeqCst);
  let outcome = processor.handle(&headers(), &body).await.unwrap();
  let record = match outcome {
    NotificationOutcome::Settled(record) => record,
    other => panic!("expected Settled, got {other:?}"),
  };
  assert!(record.payment.buyer_token_rewarded);
  assert!(record.payment.seller_token_rewarded);
  assert_eq!(record.payment.paid_at, pending.payment.paid_at);
  assert_eq!(fx.balance(BUYER).await, REWARD_TOKENS);
  assert_eq!(fx.balance(SELLER).await, REWARD_TOKENS);
  assert_eq!(fx.stores.tokens.journal_len(), 2);
}

#[tokio::test]
async fn test_refund_of_gateway_payment_without_capture_is_refused() {
  let fx = fixture();
  let (order_id, provider_order_id) = checkout(&fx).await;
  let confirmation = GatewayConfirmation {
    provider_order_id: Some(provider_order_id),
    capture_id: None,
  };
  fx.flow.confirm_gateway_payment(&order_id, &confirmation).await.unwrap();

  let refused = fx.flow.refund(&order_id, &admin()).await;
  assert!(matches!(refused, Err(SettleError::Validation(_))));
  let current = fx.current(&order_id).await;
  assert_eq!(current.order.status, OrderStatus::PaidVerified);
  assert_eq!(current.payment.status, PaymentStatus::Paid);
  assert!(fx.gateway.refunds.lock().is_empty());
}
