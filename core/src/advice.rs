// core/src/advice.rs

//! Price advice for listings, memoized through [`ContentCache`].
//! Not on the settlement path; a failed or stale lookup never touches orders.

use crate::cache::{key_for_parts, ContentCache};
use crate::error::SettleResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuery {
  pub title: String,
  #[serde(default)]
  pub category: Option<String>,
  #[serde(default)]
  pub condition: Option<String>,
}

impl PriceQuery {
  /// Only the fields that change the answer take part in the key.
  pub fn cache_key(&self) -> String {
    key_for_parts(&[
      self.title.as_str(),
      self.category.as_deref().unwrap_or_default(),
      self.condition.as_deref().unwrap_or_default(),
    ])
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceAdvice {
  pub suggested_min: i64,
  pub suggested_max: i64,
  pub currency: String,
  #[serde(default)]
  pub rationale: Option<String>,
}

#[async_trait]
pub trait PriceAdvisor: Send + Sync {
  async fn advise(&self, query: &PriceQuery) -> SettleResult<PriceAdvice>;
}

pub struct CachedAdvisor<A> {
  inner: A,
  cache: ContentCache<PriceAdvice>,
  ttl: Duration,
}

impl<A: PriceAdvisor> CachedAdvisor<A> {
  pub fn new(inner: A, max_entries: usize, ttl: Duration) -> Self {
    CachedAdvisor {
      inner,
      cache: ContentCache::new(max_entries),
      ttl,
    }
  }

  pub fn cached_entries(&self) -> usize {
    self.cache.len()
  }
}

#[async_trait]
impl<A: PriceAdvisor> PriceAdvisor for CachedAdvisor<A> {
  async fn advise(&self, query: &PriceQuery) -> SettleResult<PriceAdvice> {
    let key = query.cache_key();
    if let Some(hit) = self.cache.get(&key) {
      debug!(key = %key, "Price advice cache hit.");
      return Ok(hit);
    }
    // Failures are not cached.
    let advice = self.inner.advise(query).await?;
    self.cache.put(key, advice.clone(), self.ttl);
    Ok(advice)
  }
}
