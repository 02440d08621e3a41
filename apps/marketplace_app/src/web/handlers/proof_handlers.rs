// apps/marketplace_app/src/web/handlers/proof_handlers.rs

use actix_web::{http::header, web, HttpRequest, HttpResponse};
use tracing::{info, instrument};
use tradeflow::SlipUpload;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedActor;

/// Optional client-side file name, kept for logs only.
pub const FILE_NAME_HEADER: &str = "X-File-Name";

/// Raw image body; `Content-Type` is the declared MIME type.
#[instrument(
  name = "handler::submit_proof",
  skip(app_state, req, body, auth),
  fields(user_id = %auth.actor().user_id, size = body.len())
)]
pub async fn submit_proof_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  order_id: web::Path<String>,
  body: web::Bytes,
  auth: AuthenticatedActor,
) -> Result<HttpResponse, AppError> {
  let content_type = req
    .headers()
    .get(header::CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .unwrap_or_default()
    .to_string();
  let original_name = req
    .headers()
    .get(FILE_NAME_HEADER)
    .and_then(|v| v.to_str().ok())
    .map(String::from);

  let upload = SlipUpload {
    content_type,
    bytes: body.to_vec(),
    original_name,
  };
  let record = app_state.flow.submit_slip(&order_id, auth.actor(), &upload).await?;
  info!(order_id = %record.order.id, "Payment proof accepted.");
  Ok(HttpResponse::Ok().json(record))
}
