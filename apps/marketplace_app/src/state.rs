// apps/marketplace_app/src/state.rs
use crate::config::AppConfig;
use crate::errors::Result;
use crate::services::price_advice::HttpPriceAdvisor;
use std::sync::Arc;
use std::time::Duration;
use tradeflow::{
  CachedAdvisor, NotificationProcessor, OrderFlow, PayPalGateway, PaymentGateway, PriceAdvisor, SlipCollector,
  StoreRegistry,
};

const PRICE_ADVICE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct AppState {
  pub flow: Arc<OrderFlow>,
  /// Present when a payment gateway is configured.
  pub notifications: Option<NotificationProcessor>,
  pub advisor: Option<Arc<dyn PriceAdvisor>>,
}

impl AppState {
  /// Wires the settlement components over the given partitions.
  pub fn build(config: &AppConfig, stores: StoreRegistry) -> Result<Self> {
    let gateway: Option<Arc<dyn PaymentGateway>> = match &config.paypal {
      Some(paypal) => Some(Arc::new(PayPalGateway::new(paypal.clone())?)),
      None => None,
    };
    Self::with_gateway(config, stores, gateway)
  }

  pub fn with_gateway(
    config: &AppConfig,
    stores: StoreRegistry,
    gateway: Option<Arc<dyn PaymentGateway>>,
  ) -> Result<Self> {
    let slips = SlipCollector::new(config.slip_dir.clone(), config.slip_public_base.clone())
      .with_max_bytes(config.slip_max_bytes);
    let mut flow = OrderFlow::new(stores, config.reward.clone()).with_slips(slips);
    if let Some(gateway) = &gateway {
      flow = flow.with_gateway(gateway.clone());
    }
    let flow = Arc::new(flow);
    let notifications = gateway.map(|gateway| NotificationProcessor::new(gateway, flow.clone()));

    let advisor: Option<Arc<dyn PriceAdvisor>> = match &config.price_advice_url {
      Some(url) => {
        let remote = HttpPriceAdvisor::new(url.clone(), PRICE_ADVICE_TIMEOUT)?;
        Some(Arc::new(CachedAdvisor::new(
          remote,
          config.advice_cache_entries,
          config.advice_cache_ttl,
        )))
      }
      None => None,
    };

    Ok(AppState {
      flow,
      notifications,
      advisor,
    })
  }
}
