// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::{
  atomic::{AtomicBool, AtomicUsize, Ordering},
  Arc,
};
use tracing::Level;
use tradeflow::gateway::{CaptureResult, IntentRequest, NotificationHeaders, PaymentGateway, PaymentIntent, RefundResult};
use tradeflow::model::{CreditOutcome, CreditRequest};
use tradeflow::store::memory::MemoryTokenStore;
use tradeflow::store::{StoreRegistry, TokenStore};
use tradeflow::{
  Actor, MemoryStores, NewOrder, OrderFlow, OrderRecord, PaymentMethod, RewardPolicy, SettleError, SettleResult,
  SlipCollector, SlipUpload, TokenLedgerEntry,
};

pub const BUYER: &str = "user-buyer";
pub const SELLER: &str = "user-seller";
pub const OTHER: &str = "user-other";
pub const ADMIN: &str = "user-admin";
pub const ITEM: &str = "item-camera";
pub const REWARD_TOKENS: i64 = 10;

// --- Fake payment provider ---
#[derive(Debug, Default)]
pub struct FakeGateway {
  pub reject_signatures: AtomicBool,
  pub fail_refunds: AtomicBool,
  pub intents_created: AtomicUsize,
  pub captures: AtomicUsize,
  pub refunds: Mutex<Vec<String>>,
}

impl FakeGateway {
  pub fn capture_count(&self) -> usize {
    self.captures.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
  async fn create_intent(&self, request: &IntentRequest) -> SettleResult<PaymentIntent> {
    let n = self.intents_created.fetch_add(1, Ordering::SeqCst);
    Ok(PaymentIntent {
      provider_order_id: format!("PP-{}-{n}", request.order_id),
      status: "CREATED".to_string(),
      approve_url: Some(format!("https://provider.test/approve/{}", request.order_id)),
    })
  }

  async fn capture(&self, provider_order_id: &str) -> SettleResult<CaptureResult> {
    let n = self.captures.fetch_add(1, Ordering::SeqCst);
    Ok(CaptureResult {
      provider_order_id: provider_order_id.to_string(),
      capture_id: Some(format!("CAP-{n}")),
      status: "COMPLETED".to_string(),
    })
  }

  async fn refund(&self, capture_id: &str) -> SettleResult<RefundResult> {
    if self.fail_refunds.load(Ordering::SeqCst) {
      return Err(SettleError::Upstream {
        status: Some(503),
        body: "provider unavailable".to_string(),
      });
    }
    self.refunds.lock().push(capture_id.to_string());
    Ok(RefundResult {
      refund_id: format!("REF-{capture_id}"),
      status: "COMPLETED".to_string(),
    })
  }

  fn verify_notification(&self, _headers: &NotificationHeaders, _raw_body: &[u8]) -> bool {
    !self.reject_signatures.load(Ordering::SeqCst)
  }
}

// --- Token ledger with a switchable outage ---
#[derive(Debug)]
pub struct SwitchableLedger {
  pub inner: Arc<MemoryTokenStore>,
  pub fail_credits: AtomicBool,
}

#[async_trait]
impl TokenStore for SwitchableLedger {
  async fn entry(&self, owner_id: &str) -> SettleResult<Option<TokenLedgerEntry>> {
    self.inner.entry(owner_id).await
  }

  async fn apply_credit(&self, request: &CreditRequest) -> SettleResult<CreditOutcome> {
    if self.fail_credits.load(Ordering::SeqCst) {
      return Err(anyhow::anyhow!("token database unreachable").into());
    }
    self.inner.apply_credit(request).await
  }

  async fn has_transaction(&self, idempotency_key: &str) -> SettleResult<bool> {
    self.inner.has_transaction(idempotency_key).await
  }
}

// --- Fixture ---
pub struct Fixture {
  pub stores: MemoryStores,
  pub ledger: Arc<SwitchableLedger>,
  pub flow: Arc<OrderFlow>,
  pub gateway: Arc<FakeGateway>,
  pub slip_dir: tempfile::TempDir,
}

pub fn fixture() -> Fixture {
  setup_tracing();
  let stores = MemoryStores::new();
  stores.directory.add_user(BUYER, "Buyer");
  stores.directory.add_user(SELLER, "Seller");
  stores.directory.add_user(OTHER, "Someone Else");
  stores.directory.add_user(ADMIN, "Admin");
  stores.directory.add_item(ITEM, SELLER, "Film camera");

  let ledger = Arc::new(SwitchableLedger {
    inner: stores.tokens.clone(),
    fail_credits: AtomicBool::new(false),
  });
  let registry = StoreRegistry::new(
    stores.trading.clone(),
    ledger.clone(),
    stores.directory.clone(),
    stores.directory.clone(),
  );

  let gateway = Arc::new(FakeGateway::default());
  let slip_dir = tempfile::tempdir().expect("temp dir");
  let flow = OrderFlow::new(registry, RewardPolicy::fixed(REWARD_TOKENS))
    .with_gateway(gateway.clone())
    .with_slips(SlipCollector::new(slip_dir.path(), "/slips"));

  Fixture {
    stores,
    ledger,
    flow: Arc::new(flow),
    gateway,
    slip_dir,
  }
}

pub fn buyer() -> Actor {
  Actor::member(BUYER)
}

pub fn seller() -> Actor {
  Actor::member(SELLER)
}

pub fn other() -> Actor {
  Actor::member(OTHER)
}

pub fn admin() -> Actor {
  Actor::admin(ADMIN)
}

pub fn new_order(amount: i64, method: PaymentMethod) -> NewOrder {
  NewOrder {
    item_id: ITEM.to_string(),
    buyer_id: BUYER.to_string(),
    seller_id: SELLER.to_string(),
    amount,
    currency: "THB".to_string(),
    method,
  }
}

impl Fixture {
  pub async fn create(&self, amount: i64, method: PaymentMethod) -> OrderRecord {
    self.flow.create_order(&buyer(), new_order(amount, method)).await.expect("create order")
  }

  /// Transfer order that already has a slip and waits for the seller.
  pub async fn awaiting_verification(&self) -> OrderRecord {
    let record = self.create(10_000, PaymentMethod::Transfer).await;
    self
      .flow
      .submit_slip(&record.order.id, &buyer(), &png_upload())
      .await
      .expect("submit slip")
  }

  pub async fn current(&self, order_id: &str) -> OrderRecord {
    self.flow.get_order(order_id, &admin()).await.expect("order exists")
  }

  pub async fn balance(&self, owner: &str) -> i64 {
    self.flow.token_balance(owner).await.expect("balance")
  }

  pub fn stored_slips(&self) -> usize {
    std::fs::read_dir(self.slip_dir.path()).map(|d| d.count()).unwrap_or(0)
  }
}

// --- Payloads ---
pub fn png_upload() -> SlipUpload {
  let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
  bytes.extend_from_slice(&[0u8; 64]);
  SlipUpload {
    content_type: "image/png".to_string(),
    bytes,
    original_name: Some("slip.png".to_string()),
  }
}

pub fn pdf_upload() -> SlipUpload {
  SlipUpload {
    content_type: "application/pdf".to_string(),
    bytes: b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n".to_vec(),
    original_name: Some("slip.pdf".to_string()),
  }
}

pub fn capture_completed(order_id: &str, provider_order_id: &str, capture_id: &str) -> Vec<u8> {
  serde_json::json!({
    "id": "WH-EVENT-1",
    "event_type": "PAYMENT.CAPTURE.COMPLETED",
    "resource": {
      "id": capture_id,
      "status": "COMPLETED",
      "custom_id": order_id,
      "supplementary_data": { "related_ids": { "order_id": provider_order_id } }
    }
  })
  .to_string()
  .into_bytes()
}

pub fn order_approved(order_id: &str, provider_order_id: &str) -> Vec<u8> {
  serde_json::json!({
    "id": "WH-EVENT-2",
    "event_type": "CHECKOUT.ORDER.APPROVED",
    "resource": {
      "id": provider_order_id,
      "status": "APPROVED",
      "purchase_units": [{ "reference_id": order_id, "custom_id": order_id }]
    }
  })
  .to_string()
  .into_bytes()
}

// --- Helper for Tracing Setup (call once per test run if needed) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer() // Important for tests to capture output
    .try_init()
    .ok(); // Allow multiple initializations in tests (ok if fails)
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}
