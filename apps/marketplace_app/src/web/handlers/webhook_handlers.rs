// apps/marketplace_app/src/web/handlers/webhook_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use tracing::{error, info, instrument, warn};
use tradeflow::{NotificationHeaders, NotificationOutcome};

use crate::errors::AppError;
use crate::state::AppState;

/// Provider notifications. Verification failures and events that no longer
/// apply are acknowledged with 200 so the provider stops redelivering them;
/// storage and upstream failures return an error so it retries.
#[instrument(name = "handler::paypal_webhook", skip(app_state, req, body), fields(size = body.len()))]
pub async fn paypal_webhook_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  body: web::Bytes,
) -> Result<HttpResponse, AppError> {
  let processor = app_state
    .notifications
    .as_ref()
    .ok_or(AppError::Disabled("payment gateway"))?;

  let headers = NotificationHeaders::from_pairs(
    req
      .headers()
      .iter()
      .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v))),
  );

  match processor.handle(&headers, &body).await {
    Ok(NotificationOutcome::Discarded) => Ok(HttpResponse::Ok().json(json!({"status": "discarded"}))),
    Ok(NotificationOutcome::Ignored { event_type }) => {
      info!(event_type = %event_type, "Webhook acknowledged without action.");
      Ok(HttpResponse::Ok().json(json!({"status": "ignored", "eventType": event_type})))
    }
    Ok(NotificationOutcome::Settled(record)) => Ok(HttpResponse::Ok().json(json!({
      "status": "settled",
      "orderId": record.order.id,
      "orderStatus": record.order.status,
    }))),
    Ok(NotificationOutcome::Rejected { order_id, reason }) => {
      warn!(order_id = %order_id, reason = %reason, "Webhook payment not applied.");
      Ok(HttpResponse::Ok().json(json!({"status": "rejected", "orderId": order_id})))
    }
    Err(e) => {
      error!(error = %e, retryable = e.is_retryable(), "Webhook processing failed.");
      Err(e.into())
    }
  }
}
