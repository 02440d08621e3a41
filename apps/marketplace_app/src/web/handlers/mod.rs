// apps/marketplace_app/src/web/handlers/mod.rs

pub mod advice_handlers;
pub mod order_handlers;
pub mod proof_handlers;
pub mod token_handlers;
pub mod webhook_handlers;
