// apps/marketplace_app/src/web/handlers/advice_handlers.rs

use actix_web::{web, HttpResponse};
use tracing::instrument;
use tradeflow::{PriceQuery, SettleError};

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedActor;

#[instrument(name = "handler::price_advice", skip(app_state, query, _auth), fields(title = %query.title))]
pub async fn price_advice_handler(
  app_state: web::Data<AppState>,
  query: web::Json<PriceQuery>,
  _auth: AuthenticatedActor,
) -> Result<HttpResponse, AppError> {
  let advisor = app_state.advisor.as_ref().ok_or(AppError::Disabled("price advice"))?;
  if query.title.trim().is_empty() {
    return Err(SettleError::validation("title is required").into());
  }
  let advice = advisor.advise(&query).await?;
  Ok(HttpResponse::Ok().json(advice))
}
