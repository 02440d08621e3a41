// core/src/gateway/notification.rs

//! Inbound provider notifications (webhooks).
//!
//! The processor verifies the signature, reads the event, and drives
//! `OrderFlow::confirm_gateway_payment`. It keeps no delivery log of its own:
//! replays are harmless because the confirmation is idempotent.

use super::{NotificationHeaders, PaymentGateway};
use crate::error::{SettleError, SettleResult};
use crate::flow::{check_confirmable, GatewayConfirmation, OrderFlow};
use crate::model::PaymentStatus;
use crate::store::OrderRecord;
use serde_json::Value as JsonValue;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

pub const EVENT_ORDER_APPROVED: &str = "CHECKOUT.ORDER.APPROVED";
pub const EVENT_CAPTURE_COMPLETED: &str = "PAYMENT.CAPTURE.COMPLETED";

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationOutcome {
  /// Signature check failed; the notification was dropped.
  Discarded,
  /// Verified, but not an event this service acts on.
  Ignored { event_type: String },
  /// Verified and applied (or already applied earlier).
  Settled(Box<OrderRecord>),
  /// Verified, but the order can no longer accept a payment (e.g. cancelled).
  Rejected { order_id: String, reason: String },
}

/// Fields pulled out of a provider event body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedEvent {
  pub event_type: String,
  pub order_id: Option<String>,
  pub provider_order_id: Option<String>,
  pub capture_id: Option<String>,
}

pub fn parse_event(raw_body: &[u8]) -> SettleResult<ParsedEvent> {
  let event: JsonValue = serde_json::from_slice(raw_body)
    .map_err(|e| SettleError::validation(format!("invalid notification payload: {e}")))?;
  let event_type = event["event_type"]
    .as_str()
    .ok_or_else(|| SettleError::validation("notification without event_type"))?
    .to_string();
  let resource = &event["resource"];
  let text = |v: &JsonValue| v.as_str().map(String::from);

  let parsed = match event_type.as_str() {
    EVENT_ORDER_APPROVED => ParsedEvent {
      order_id: text(&resource["purchase_units"][0]["custom_id"])
        .or_else(|| text(&resource["purchase_units"][0]["reference_id"])),
      provider_order_id: text(&resource["id"]),
      capture_id: None,
      event_type,
    },
    EVENT_CAPTURE_COMPLETED => ParsedEvent {
      order_id: text(&resource["custom_id"]),
      provider_order_id: text(&resource["supplementary_data"]["related_ids"]["order_id"]),
      capture_id: text(&resource["id"]),
      event_type,
    },
    _ => ParsedEvent {
      event_type,
      ..ParsedEvent::default()
    },
  };
  Ok(parsed)
}

#[derive(Clone)]
pub struct NotificationProcessor {
  gateway: Arc<dyn PaymentGateway>,
  flow: Arc<OrderFlow>,
}

impl NotificationProcessor {
  pub fn new(gateway: Arc<dyn PaymentGateway>, flow: Arc<OrderFlow>) -> Self {
    NotificationProcessor { gateway, flow }
  }

  #[instrument(skip(self, headers, raw_body), fields(transmission_id = ?headers.transmission_id, size = raw_body.len()))]
  pub async fn handle(&self, headers: &NotificationHeaders, raw_body: &[u8]) -> SettleResult<NotificationOutcome> {
    if !self.gateway.verify_notification(headers, raw_body) {
      warn!("Discarding provider notification with an invalid signature.");
      return Ok(NotificationOutcome::Discarded);
    }

    let event = parse_event(raw_body)?;
    if event.event_type != EVENT_ORDER_APPROVED && event.event_type != EVENT_CAPTURE_COMPLETED {
      info!(event_type = %event.event_type, "Ignoring provider notification.");
      return Ok(NotificationOutcome::Ignored {
        event_type: event.event_type,
      });
    }

    let order_id = self.resolve_order_id(&event).await?;
    let mut captured_here = None;
    let mut confirmation = GatewayConfirmation {
      provider_order_id: event.provider_order_id.clone(),
      capture_id: event.capture_id.clone(),
    };

    if event.event_type == EVENT_ORDER_APPROVED {
      // Approval alone moves no money. Capture only what this order can still
      // accept; a replay that finds it already paid skips the capture.
      let Some(record) = self.flow.stores().trading.find(&order_id).await? else {
        return Ok(rejected(order_id, "order does not exist"));
      };
      if record.payment.status != PaymentStatus::Paid {
        let provider_order_id = match (&event.provider_order_id, &record.payment.provider_order_id) {
          (Some(got), Some(expected)) if got == expected => got.clone(),
          _ => return Ok(rejected(order_id, "approval is not for the provider order started by this order")),
        };
        if let Err(e) = check_confirmable(&record, &confirmation) {
          return Ok(rejected(order_id, e));
        }
        let capture = self.gateway.capture(&provider_order_id).await?;
        if !capture.is_completed() {
          info!(status = %capture.status, "Capture not completed yet; waiting for the capture notification.");
          return Ok(NotificationOutcome::Ignored {
            event_type: event.event_type,
          });
        }
        confirmation.capture_id = capture.capture_id.clone();
        captured_here = capture.capture_id;
      }
    }

    match self.flow.confirm_gateway_payment(&order_id, &confirmation).await {
      Ok(record) => Ok(NotificationOutcome::Settled(Box::new(record))),
      Err(e @ SettleError::InvalidState { .. }) | Err(e @ SettleError::Validation(_)) => {
        if let Some(capture_id) = captured_here {
          // The order changed between the checks above and the confirmation.
          self.return_capture(&order_id, &capture_id).await;
        }
        Ok(rejected(order_id, e))
      }
      Err(other) => Err(other),
    }
  }

  async fn return_capture(&self, order_id: &str, capture_id: &str) {
    match self.gateway.refund(capture_id).await {
      Ok(refund) => info!(order_id, capture_id, refund_id = %refund.refund_id, "Returned a capture the order could not accept."),
      Err(e) => error!(
        order_id,
        capture_id,
        error = %e,
        "Capture for an order that cannot accept it was not refunded; needs manual refund."
      ),
    }
  }

  async fn resolve_order_id(&self, event: &ParsedEvent) -> SettleResult<String> {
    if let Some(id) = &event.order_id {
      return Ok(id.clone());
    }
    if let Some(provider_order_id) = &event.provider_order_id {
      if let Some(record) = self.flow.stores().trading.find_by_provider_order(provider_order_id).await? {
        return Ok(record.order.id);
      }
    }
    Err(SettleError::validation(format!(
      "{} notification does not reference a known order",
      event.event_type
    )))
  }
}

fn rejected(order_id: String, reason: impl Display) -> NotificationOutcome {
  warn!(order_id = %order_id, %reason, "Provider payment the order cannot accept.");
  NotificationOutcome::Rejected {
    order_id,
    reason: reason.to_string(),
  }
}
