//! In-memory payment platform for the demo binary and tests.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::{
    PaymentPlatform, PlatformError, PlatformErrorCode, PurchaseResult, RestoreResults,
    RetrieveResults, TransactionReceiver,
};
use crate::types::{PaymentTransaction, Product, Purchase, PurchaseDetails, TransactionState};

/// Products and prior purchases the sandbox starts with
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SandboxCatalog {
    pub products: Vec<Product>,
    /// Product ids already bought by this user (returned by restore)
    #[serde(default)]
    pub owned: Vec<String>,
}

impl SandboxCatalog {
    /// Load a catalog from a JSON file.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// A catalog holding one USD product.
    pub fn single(product_id: &str, title: &str, price_cents: i64) -> Self {
        Self {
            products: vec![sandbox_product(product_id, title, price_cents)],
            owned: Vec::new(),
        }
    }
}

/// Build a USD product with a formatted localized price.
pub fn sandbox_product(product_id: &str, title: &str, price_cents: i64) -> Product {
    Product {
        product_id: product_id.to_string(),
        localized_title: title.to_string(),
        localized_description: format!("Unlocks {}", title),
        price: price_cents,
        currency_code: "USD".to_string(),
        localized_price: Some(format!("${}.{:02}", price_cents / 100, price_cents % 100)),
    }
}

/// How the next purchase request is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Success,
    /// The user dismissed the payment sheet
    Cancel,
    Fail(PlatformErrorCode),
}

/// Number of calls made to each platform entry point
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub retrieve_products_info: u32,
    pub purchase_product: u32,
    pub restore_purchases: u32,
}

impl CallCounts {
    pub fn total(&self) -> u32 {
        self.retrieve_products_info + self.purchase_product + self.restore_purchases
    }
}

#[derive(Default)]
struct SandboxState {
    catalog: HashMap<String, Product>,
    owned: Vec<String>,
    purchase_outcomes: VecDeque<PurchaseOutcome>,
    restore_failures: Vec<(PlatformError, Option<String>)>,
    /// Upcoming calls that fail with a network error
    transient_failures: u32,
    /// Transactions delivered but not yet finished
    pending: Vec<Purchase>,
    finished: Vec<String>,
    subscribers: Vec<mpsc::UnboundedSender<Vec<Purchase>>>,
    calls: CallCounts,
}

impl SandboxState {
    fn take_transient_failure(&mut self) -> bool {
        if self.transient_failures > 0 {
            self.transient_failures -= 1;
            true
        } else {
            false
        }
    }

    fn broadcast(&mut self, batch: Vec<Purchase>) {
        self.subscribers.retain(|tx| tx.send(batch.clone()).is_ok());
    }
}

/// A [`PaymentPlatform`] backed by in-memory state.
///
/// Behaviour is scripted through the `script_*` methods; every call is
/// counted so callers can assert how much platform traffic a flow caused.
#[derive(Default)]
pub struct SandboxPlatform {
    state: Mutex<SandboxState>,
    latency: Duration,
}

impl SandboxPlatform {
    pub fn new(catalog: SandboxCatalog) -> Self {
        let state = SandboxState {
            catalog: catalog
                .products
                .into_iter()
                .map(|p| (p.product_id.clone(), p))
                .collect(),
            owned: catalog.owned,
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
            latency: Duration::ZERO,
        }
    }

    /// Delay every async call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn state(&self) -> MutexGuard<'_, SandboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    /// Queue the outcome of the next purchase request.
    pub fn script_purchase(&self, outcome: PurchaseOutcome) {
        self.state().purchase_outcomes.push_back(outcome);
    }

    /// Make the next restore report a failure for `product_id`.
    pub fn script_restore_failure(&self, code: PlatformErrorCode, product_id: Option<&str>) {
        self.state()
            .restore_failures
            .push((PlatformError::from_code(code), product_id.map(String::from)));
    }

    /// Fail the next `count` calls with a network error.
    pub fn script_transient_failures(&self, count: u32) {
        self.state().transient_failures = count;
    }

    /// Mark a product as previously bought so restore returns it.
    pub fn grant_ownership(&self, product_id: &str) {
        let mut state = self.state();
        if !state.owned.iter().any(|id| id == product_id) {
            state.owned.push(product_id.to_string());
        }
    }

    /// Push a transaction into the queue, as the platform does for purchases
    /// completed outside the app or interrupted on a previous launch.
    pub fn enqueue_transaction(
        &self,
        product_id: &str,
        state: TransactionState,
    ) -> PaymentTransaction {
        let transaction = PaymentTransaction::new(product_id, state);
        let purchase = Purchase {
            product_id: product_id.to_string(),
            quantity: 1,
            transaction: transaction.clone(),
            needs_finish_transaction: true,
        };

        let mut guard = self.state();
        if state == TransactionState::Purchased && !guard.owned.iter().any(|id| id == product_id) {
            guard.owned.push(product_id.to_string());
        }
        guard.pending.push(purchase.clone());
        guard.broadcast(vec![purchase]);

        transaction
    }

    /// Transaction ids acknowledged so far, in order.
    pub fn finished_transactions(&self) -> Vec<String> {
        self.state().finished.clone()
    }

    /// Transactions still waiting to be finished.
    pub fn pending_transactions(&self) -> Vec<PaymentTransaction> {
        self.state()
            .pending
            .iter()
            .map(|p| p.transaction.clone())
            .collect()
    }

    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }
}

#[async_trait]
impl PaymentPlatform for SandboxPlatform {
    async fn retrieve_products_info(&self, product_ids: &[String]) -> RetrieveResults {
        self.simulate_latency().await;
        let mut state = self.state();
        state.calls.retrieve_products_info += 1;

        if state.take_transient_failure() {
            return RetrieveResults {
                error: Some(PlatformError::from_code(PlatformErrorCode::Network)),
                ..Default::default()
            };
        }

        let mut results = RetrieveResults::default();
        for id in product_ids {
            match state.catalog.get(id) {
                Some(product) => results.retrieved_products.push(product.clone()),
                None => results.invalid_product_ids.push(id.clone()),
            }
        }
        results
    }

    async fn purchase_product(
        &self,
        product_id: &str,
        quantity: u32,
        atomically: bool,
    ) -> PurchaseResult {
        self.simulate_latency().await;
        let mut state = self.state();
        state.calls.purchase_product += 1;

        if state.take_transient_failure() {
            return Err(PlatformError::from_code(PlatformErrorCode::Network));
        }

        let outcome = state
            .purchase_outcomes
            .pop_front()
            .unwrap_or(PurchaseOutcome::Success);

        let product = match outcome {
            PurchaseOutcome::Cancel => {
                return Err(PlatformError::from_code(PlatformErrorCode::PaymentCancelled));
            }
            PurchaseOutcome::Fail(code) => return Err(PlatformError::from_code(code)),
            PurchaseOutcome::Success => match state.catalog.get(product_id) {
                Some(p) => p.clone(),
                None => return Err(PlatformError::from_code(PlatformErrorCode::PaymentInvalid)),
            },
        };

        let transaction = PaymentTransaction::new(product_id, TransactionState::Purchased);
        if !state.owned.iter().any(|id| id == product_id) {
            state.owned.push(product_id.to_string());
        }

        if atomically {
            state.finished.push(transaction.transaction_id.clone());
        } else {
            state.pending.push(Purchase {
                product_id: product_id.to_string(),
                quantity,
                transaction: transaction.clone(),
                needs_finish_transaction: true,
            });
        }

        Ok(PurchaseDetails {
            product_id: product_id.to_string(),
            quantity,
            product: Some(product),
            transaction,
            needs_finish_transaction: !atomically,
        })
    }

    async fn restore_purchases(&self, atomically: bool) -> RestoreResults {
        self.simulate_latency().await;
        let mut state = self.state();
        state.calls.restore_purchases += 1;

        if state.take_transient_failure() {
            return RestoreResults {
                restored_purchases: Vec::new(),
                restore_failed_purchases: vec![(
                    PlatformError::from_code(PlatformErrorCode::Network),
                    None,
                )],
            };
        }

        let owned = state.owned.clone();
        let mut restored = Vec::with_capacity(owned.len());
        for product_id in owned {
            let transaction = PaymentTransaction::new(&product_id, TransactionState::Restored);
            if atomically {
                state.finished.push(transaction.transaction_id.clone());
            }
            restored.push(Purchase {
                product_id,
                quantity: 1,
                transaction,
                needs_finish_transaction: !atomically,
            });
        }

        RestoreResults {
            restored_purchases: restored,
            restore_failed_purchases: std::mem::take(&mut state.restore_failures),
        }
    }

    fn transaction_updates(&self) -> TransactionReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state();
        if !state.pending.is_empty() {
            let _ = tx.send(state.pending.clone());
        }
        state.subscribers.push(tx);
        rx
    }

    fn finish_transaction(&self, transaction: &PaymentTransaction) {
        let mut state = self.state();
        let before = state.pending.len();
        state
            .pending
            .retain(|p| p.transaction.transaction_id != transaction.transaction_id);
        if state.pending.len() == before {
            tracing::debug!("Transaction {} already finished", transaction.transaction_id);
            return;
        }
        state.finished.push(transaction.transaction_id.clone());
    }
}
