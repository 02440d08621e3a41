// apps/marketplace_app/src/web/handlers/token_handlers.rs

use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedActor;

pub async fn my_tokens_handler(
  app_state: web::Data<AppState>,
  auth: AuthenticatedActor,
) -> Result<HttpResponse, AppError> {
  let owner_id = &auth.actor().user_id;
  let balance = app_state.flow.token_balance(owner_id).await?;
  Ok(HttpResponse::Ok().json(json!({ "ownerId": owner_id, "balance": balance })))
}
