// apps/marketplace_app/src/web/routes.rs

use actix_web::web;

use crate::web::handlers::{advice_handlers, order_handlers, proof_handlers, token_handlers, webhook_handlers};

async fn health_check_handler() -> actix_web::HttpResponse {
  actix_web::HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg.service(
    web::scope("/api/v1")
      .route("/health", web::get().to(health_check_handler))
      .service(
        web::scope("/orders")
          .route("", web::post().to(order_handlers::create_order_handler))
          .route("", web::get().to(order_handlers::list_orders_handler))
          .route("/{order_id}", web::get().to(order_handlers::get_order_handler))
          .route("/{order_id}", web::delete().to(order_handlers::delete_order_handler))
          .route("/{order_id}/proof", web::post().to(proof_handlers::submit_proof_handler))
          .route("/{order_id}/verify", web::post().to(order_handlers::verify_order_handler))
          .route("/{order_id}/complete", web::post().to(order_handlers::complete_order_handler))
          .route("/{order_id}/cancel", web::post().to(order_handlers::cancel_order_handler))
          .route("/{order_id}/refund", web::post().to(order_handlers::refund_order_handler))
          .route("/{order_id}/checkout", web::post().to(order_handlers::start_checkout_handler))
          .route(
            "/{order_id}/rewards/settle",
            web::post().to(order_handlers::settle_rewards_handler),
          ),
      )
      .route("/tokens/me", web::get().to(token_handlers::my_tokens_handler))
      .route("/price-advice", web::post().to(advice_handlers::price_advice_handler))
      .service(web::scope("/webhooks").route("/paypal", web::post().to(webhook_handlers::paypal_webhook_handler))),
  );
}
