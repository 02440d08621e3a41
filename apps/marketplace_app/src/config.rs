// apps/marketplace_app/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tradeflow::{PayPalConfig, RewardPolicy};

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,

  // One database per partition; never joined.
  pub trading_database_url: String,
  pub token_database_url: String,
  pub user_database_url: String,
  pub db_max_connections: u32,
  /// Create missing tables on start-up.
  pub apply_schema: bool,

  /// `None` when PAYPAL_CLIENT_ID is unset: gateway checkout and webhooks are disabled.
  pub paypal: Option<PayPalConfig>,

  pub reward: RewardPolicy,

  pub slip_dir: String,
  pub slip_public_base: String,
  pub slip_max_bytes: usize,

  /// `None` disables `/price-advice`.
  pub price_advice_url: Option<String>,
  pub advice_cache_entries: usize,
  pub advice_cache_ttl: Duration,
}

fn optional(var_name: &str) -> Option<String> {
  env::var(var_name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(var_name: &str, default: T) -> Result<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  match optional(var_name) {
    None => Ok(default),
    Some(raw) => raw
      .trim()
      .parse::<T>()
      .map_err(|e| AppError::Config(format!("Invalid {}: {}", var_name, e))),
  }
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok(); // Load .env file if present

    let required = |var_name: &str| {
      env::var(var_name).map_err(|e| AppError::Config(format!("Missing environment variable '{}': {}", var_name, e)))
    };

    let server_host = optional("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
    let server_port = parsed("SERVER_PORT", 8080u16)?;

    let trading_database_url = required("TRADING_DATABASE_URL")?;
    let token_database_url = required("TOKEN_DATABASE_URL")?;
    let user_database_url = required("USER_DATABASE_URL")?;
    let db_max_connections = parsed("DB_MAX_CONNECTIONS", 10u32)?;
    let apply_schema = parsed("APPLY_SCHEMA", false)?;

    let paypal = match optional("PAYPAL_CLIENT_ID") {
      None => None,
      Some(client_id) => {
        let client_secret = required("PAYPAL_CLIENT_SECRET")?;
        let mut cfg = PayPalConfig::sandbox(client_id, client_secret);
        if let Some(base_url) = optional("PAYPAL_BASE_URL") {
          cfg.base_url = base_url;
        }
        cfg.webhook_id = optional("PAYPAL_WEBHOOK_ID").unwrap_or_default();
        cfg.webhook_secret = optional("PAYPAL_WEBHOOK_SECRET");
        cfg.request_timeout = Duration::from_secs(parsed("PAYPAL_TIMEOUT_SECS", 15u64)?);
        Some(cfg)
      }
    };

    let defaults = RewardPolicy::default();
    let reward = RewardPolicy {
      buyer_tokens: parsed("REWARD_BUYER_TOKENS", defaults.buyer_tokens)?,
      seller_tokens: parsed("REWARD_SELLER_TOKENS", defaults.seller_tokens)?,
      per_amount_divisor: parsed("REWARD_PER_AMOUNT_DIVISOR", defaults.per_amount_divisor)?,
    };
    if reward.buyer_tokens < 0 || reward.seller_tokens < 0 || reward.per_amount_divisor < 0 {
      return Err(AppError::Config("Reward settings must not be negative".to_string()));
    }

    let slip_dir = optional("SLIP_DIR").unwrap_or_else(|| "./uploads/slips".to_string());
    let slip_public_base = optional("SLIP_PUBLIC_BASE").unwrap_or_else(|| "/uploads/slips".to_string());
    let slip_max_bytes = parsed("SLIP_MAX_BYTES", tradeflow::slip::MAX_SLIP_BYTES)?;

    let price_advice_url = optional("PRICE_ADVICE_URL");
    let advice_cache_entries = parsed("ADVICE_CACHE_ENTRIES", 1024usize)?;
    let advice_cache_ttl = Duration::from_secs(parsed("ADVICE_CACHE_TTL_SECS", 3600u64)?);

    tracing::info!(
      paypal_enabled = paypal.is_some(),
      price_advice_enabled = price_advice_url.is_some(),
      "Application configuration loaded successfully."
    );
    // Database URLs and provider secrets stay out of the log.

    Ok(Self {
      server_host,
      server_port,
      trading_database_url,
      token_database_url,
      user_database_url,
      db_max_connections,
      apply_schema,
      paypal,
      reward,
      slip_dir,
      slip_public_base,
      slip_max_bytes,
      price_advice_url,
      advice_cache_entries,
      advice_cache_ttl,
    })
  }
}

#[cfg(test)]
impl AppConfig {
  /// Settings for handler tests: no databases are touched, slips go to `slip_dir`.
  pub fn for_tests(slip_dir: &std::path::Path) -> Self {
    AppConfig {
      server_host: "127.0.0.1".to_string(),
      server_port: 0,
      trading_database_url: String::new(),
      token_database_url: String::new(),
      user_database_url: String::new(),
      db_max_connections: 1,
      apply_schema: false,
      paypal: None,
      reward: RewardPolicy::default(),
      slip_dir: slip_dir.display().to_string(),
      slip_public_base: "/uploads/slips".to_string(),
      slip_max_bytes: tradeflow::slip::MAX_SLIP_BYTES,
      price_advice_url: None,
      advice_cache_entries: 16,
      advice_cache_ttl: Duration::from_secs(60),
    }
  }
}
