// apps/marketplace_app/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use tradeflow::{NewOrder, PaymentMethod};

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedActor;

fn default_currency() -> String {
  "THB".to_string()
}

// --- Request DTO ---
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderPayload {
  pub item_id: String,
  pub seller_id: String,
  /// Admins may create an order on a buyer's behalf.
  pub buyer_id: Option<String>,
  /// Minor units.
  pub amount: i64,
  #[serde(default = "default_currency")]
  pub currency: String,
  pub method: PaymentMethod,
}

// --- Handler Implementation ---

#[instrument(
  name = "handler::create_order",
  skip(app_state, payload, auth),
  fields(user_id = %auth.actor().user_id, item_id = %payload.item_id)
)]
pub async fn create_order_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<CreateOrderPayload>,
  auth: AuthenticatedActor,
) -> Result<HttpResponse, AppError> {
  let payload = payload.into_inner();
  let new_order = NewOrder {
    item_id: payload.item_id,
    buyer_id: payload.buyer_id.unwrap_or_else(|| auth.actor().user_id.clone()),
    seller_id: payload.seller_id,
    amount: payload.amount,
    currency: payload.currency,
    method: payload.method,
  };
  let record = app_state.flow.create_order(auth.actor(), new_order).await?;
  info!(order_id = %record.order.id, "Order created via API.");
  Ok(HttpResponse::Created().json(record))
}

#[instrument(name = "handler::list_orders", skip(app_state, auth), fields(user_id = %auth.actor().user_id))]
pub async fn list_orders_handler(
  app_state: web::Data<AppState>,
  auth: AuthenticatedActor,
) -> Result<HttpResponse, AppError> {
  let orders = app_state.flow.list_orders(auth.actor()).await?;
  Ok(HttpResponse::Ok().json(orders))
}

pub async fn get_order_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<String>,
  auth: AuthenticatedActor,
) -> Result<HttpResponse, AppError> {
  let record = app_state.flow.get_order(&order_id, auth.actor()).await?;
  Ok(HttpResponse::Ok().json(record))
}

#[instrument(name = "handler::verify_order", skip(app_state, auth), fields(user_id = %auth.actor().user_id))]
pub async fn verify_order_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<String>,
  auth: AuthenticatedActor,
) -> Result<HttpResponse, AppError> {
  let record = app_state.flow.verify(&order_id, auth.actor()).await?;
  Ok(HttpResponse::Ok().json(record))
}

#[instrument(name = "handler::complete_order", skip(app_state, auth), fields(user_id = %auth.actor().user_id))]
pub async fn complete_order_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<String>,
  auth: AuthenticatedActor,
) -> Result<HttpResponse, AppError> {
  let record = app_state.flow.complete(&order_id, auth.actor()).await?;
  Ok(HttpResponse::Ok().json(record))
}

#[instrument(name = "handler::cancel_order", skip(app_state, auth), fields(user_id = %auth.actor().user_id))]
pub async fn cancel_order_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<String>,
  auth: AuthenticatedActor,
) -> Result<HttpResponse, AppError> {
  let record = app_state.flow.cancel(&order_id, auth.actor()).await?;
  Ok(HttpResponse::Ok().json(record))
}

#[instrument(name = "handler::refund_order", skip(app_state, auth), fields(user_id = %auth.actor().user_id))]
pub async fn refund_order_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<String>,
  auth: AuthenticatedActor,
) -> Result<HttpResponse, AppError> {
  let record = app_state.flow.refund(&order_id, auth.actor()).await?;
  Ok(HttpResponse::Ok().json(record))
}

/// Creates the provider-side payment and returns where the buyer approves it.
#[instrument(name = "handler::start_checkout", skip(app_state, auth), fields(user_id = %auth.actor().user_id))]
pub async fn start_checkout_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<String>,
  auth: AuthenticatedActor,
) -> Result<HttpResponse, AppError> {
  let intent = app_state.flow.start_gateway_checkout(&order_id, auth.actor()).await?;
  info!(provider_order_id = %intent.provider_order_id, "Gateway checkout started.");
  Ok(HttpResponse::Ok().json(json!({
    "orderId": order_id.as_str(),
    "providerOrderId": intent.provider_order_id,
    "status": intent.status,
    "approveUrl": intent.approve_url,
  })))
}

#[instrument(name = "handler::settle_rewards", skip(app_state, auth), fields(user_id = %auth.actor().user_id))]
pub async fn settle_rewards_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<String>,
  auth: AuthenticatedActor,
) -> Result<HttpResponse, AppError> {
  let record = app_state.flow.settle_rewards(&order_id, auth.actor()).await?;
  Ok(HttpResponse::Ok().json(record))
}

#[instrument(name = "handler::delete_order", skip(app_state, auth), fields(user_id = %auth.actor().user_id))]
pub async fn delete_order_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<String>,
  auth: AuthenticatedActor,
) -> Result<HttpResponse, AppError> {
  app_state.flow.soft_delete(&order_id, auth.actor()).await?;
  Ok(HttpResponse::NoContent().finish())
}
