// apps/marketplace_app/src/main.rs

mod config;
mod db;
mod errors;
mod services;
mod state;
mod web;

use crate::config::AppConfig;
use crate::db::Pools;
use crate::state::AppState;

use actix_web::{web as actix_data, App, HttpServer};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
  tracing_subscriber::fmt()
    .with_max_level(Level::INFO)
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()) // Allow RUST_LOG override
    .with_span_events(FmtSpan::CLOSE)
    .init();

  tracing::info!("Starting marketplace settlement server...");

  let app_config = match AppConfig::from_env() {
    Ok(cfg) => Arc::new(cfg),
    Err(e) => {
      tracing::error!(error = %e, "Failed to load application configuration.");
      return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()));
    }
  };

  let pools = match Pools::connect(&app_config).await {
    Ok(pools) => pools,
    Err(e) => {
      tracing::error!(error = %e, "Failed to connect to the databases.");
      return Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, e.to_string()));
    }
  };

  if app_config.apply_schema {
    if let Err(e) = pools.apply_schema().await {
      tracing::error!(error = %e, "Failed to apply database schema.");
      return Err(std::io::Error::other(e.to_string()));
    }
  }

  let app_state = match AppState::build(&app_config, pools.registry()) {
    Ok(state) => state,
    Err(e) => {
      tracing::error!(error = %e, "Failed to initialise settlement components.");
      return Err(std::io::Error::other(e.to_string()));
    }
  };
  tracing::info!(flow = ?app_state.flow, "Settlement components ready.");

  // Slip bodies arrive raw; leave headroom so the slip validator reports oversize files itself.
  let payload_limit = app_config.slip_max_bytes.saturating_mul(2);

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  tracing::info!("Attempting to bind server to {}...", server_address);

  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .app_data(actix_data::PayloadConfig::new(payload_limit))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(web::configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await
}
