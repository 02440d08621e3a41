// core/src/flow/transitions.rs

//! The transition table. Anything not listed here is an `InvalidState`.

use crate::error::{SettleError, SettleResult};
use crate::model::{Actor, Order, OrderStatus, PaymentMethod};
use crate::store::OrderRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
  SubmitProof,
  Verify,
  ConfirmGateway,
  Complete,
  Cancel,
  Refund,
}

impl Transition {
  pub fn name(&self) -> &'static str {
    match self {
      Transition::SubmitProof => "submit_proof",
      Transition::Verify => "verify",
      Transition::ConfirmGateway => "confirm_gateway_payment",
      Transition::Complete => "complete",
      Transition::Cancel => "cancel",
      Transition::Refund => "refund",
    }
  }

  pub fn target(&self) -> OrderStatus {
    match self {
      Transition::SubmitProof => OrderStatus::PaidPendingVerify,
      Transition::Verify | Transition::ConfirmGateway => OrderStatus::PaidVerified,
      Transition::Complete => OrderStatus::Fulfilled,
      Transition::Cancel => OrderStatus::Cancelled,
      Transition::Refund => OrderStatus::Refunded,
    }
  }

  pub fn allowed_from(&self, from: OrderStatus, method: PaymentMethod) -> bool {
    use OrderStatus::*;
    match self {
      Transition::SubmitProof => from == PendingPayment && method.is_manual(),
      Transition::Verify => from == PaidPendingVerify,
      Transition::ConfirmGateway => matches!(from, PendingPayment | PaidPendingVerify) && method.is_gateway(),
      Transition::Complete => from == PaidVerified,
      Transition::Cancel => !from.is_terminal(),
      Transition::Refund => from == PaidVerified,
    }
  }

  /// Role check only; state is checked separately by [`check_state`].
  pub fn permits(&self, actor: &Actor, order: &Order) -> bool {
    let buyer = order.is_buyer(&actor.user_id);
    let seller = order.is_seller(&actor.user_id);
    match self {
      Transition::SubmitProof => buyer || actor.is_admin(),
      Transition::Verify => seller || actor.is_admin(),
      // Driven by the provider notification, never by an end user.
      Transition::ConfirmGateway => false,
      Transition::Complete => buyer || seller,
      Transition::Cancel => buyer || seller || actor.is_admin(),
      Transition::Refund => actor.is_admin(),
    }
  }
}

pub fn authorize(transition: Transition, actor: &Actor, order: &Order) -> SettleResult<()> {
  if transition.permits(actor, order) {
    Ok(())
  } else {
    Err(SettleError::authorization(format!(
      "user {} may not {} order {}",
      actor.user_id,
      transition.name(),
      order.id
    )))
  }
}

pub fn check_state(transition: Transition, record: &OrderRecord) -> SettleResult<()> {
  let order = &record.order;
  if order.is_deleted {
    return Err(SettleError::invalid_state(&order.id, transition.name(), "DELETED"));
  }
  if !transition.allowed_from(order.status, record.payment.method) {
    return Err(SettleError::invalid_state(&order.id, transition.name(), order.status));
  }
  Ok(())
}
