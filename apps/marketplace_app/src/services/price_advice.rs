// apps/marketplace_app/src/services/price_advice.rs

//! Remote price advice service. Wrapped in `tradeflow::CachedAdvisor` at start-up.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, instrument};
use tradeflow::{PriceAdvice, PriceAdvisor, PriceQuery, SettleError, SettleResult};

#[derive(Debug, Clone)]
pub struct HttpPriceAdvisor {
  url: String,
  http: reqwest::Client,
}

impl HttpPriceAdvisor {
  pub fn new(url: impl Into<String>, timeout: Duration) -> SettleResult<Self> {
    let http = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(HttpPriceAdvisor { url: url.into(), http })
  }
}

#[async_trait]
impl PriceAdvisor for HttpPriceAdvisor {
  #[instrument(name = "price_advice::advise", skip(self, query), fields(title = %query.title))]
  async fn advise(&self, query: &PriceQuery) -> SettleResult<PriceAdvice> {
    let response = self.http.post(&self.url).json(query).send().await?;
    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(SettleError::Upstream {
        status: Some(status.as_u16()),
        body,
      });
    }
    let advice: PriceAdvice = response.json().await?;
    if advice.suggested_min > advice.suggested_max {
      return Err(SettleError::Upstream {
        status: Some(status.as_u16()),
        body: "advice range is inverted".to_string(),
      });
    }
    info!(min = advice.suggested_min, max = advice.suggested_max, "Price advice fetched.");
    Ok(advice)
  }
}
