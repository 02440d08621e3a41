// apps/marketplace_app/src/services/mod.rs
pub mod price_advice;
