//! Purchase gateway: the async facade the UI layer talks to.
//!
//! Every one-shot operation resolves to exactly one `Result`. Transaction
//! observation is the only long-lived operation and is exposed as a
//! [`Stream`] that stays open for as long as the platform's queue does.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use futures::Stream;

use crate::error::{IapError, Result};
use crate::platform::{PaymentPlatform, PlatformErrorCode, TransactionReceiver};
use crate::retry::RetryPolicy;
use crate::types::{Product, Purchase, PurchaseDetails, TransactionUpdate};

/// Facade over a [`PaymentPlatform`].
///
/// Construct one per process and share it (`Arc<PurchaseGateway>`) with
/// whoever needs it.
///
/// # Example
/// ```rust,no_run
/// use std::sync::Arc;
/// use iapkit::{PurchaseGateway, SandboxCatalog, SandboxPlatform};
///
/// # async fn demo() -> iapkit::Result<()> {
/// let platform = SandboxPlatform::new(SandboxCatalog::single("pro", "Pro", 299));
/// let gateway = PurchaseGateway::new(Arc::new(platform));
///
/// let price = gateway.fetch_localized_price("pro").await?;
/// println!("Pro costs {}", price);
///
/// gateway.purchase("pro").await?;
/// # Ok(())
/// # }
/// ```
pub struct PurchaseGateway {
    platform: Arc<dyn PaymentPlatform>,
    retry: RetryPolicy,
}

impl PurchaseGateway {
    pub fn new(platform: Arc<dyn PaymentPlatform>) -> Self {
        Self {
            platform,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Subscribe to the platform's transaction queue.
    ///
    /// Purchased and restored transactions are finished with the platform
    /// before they are yielded; every other state passes through untouched.
    pub fn observe_transaction_state(&self) -> TransactionStateStream {
        TransactionStateStream {
            platform: Arc::clone(&self.platform),
            receiver: self.platform.transaction_updates(),
            buffered: VecDeque::new(),
        }
    }

    /// Fetch the storefront-formatted price of a single product.
    ///
    /// Yields an empty string when the platform knows the product but has no
    /// formatted price for it.
    pub async fn fetch_localized_price(&self, product_id: &str) -> Result<String> {
        self.retry
            .run("fetch_localized_price", || self.try_fetch_localized_price(product_id))
            .await
    }

    async fn try_fetch_localized_price(&self, product_id: &str) -> Result<String> {
        let results = self
            .platform
            .retrieve_products_info(&[product_id.to_string()])
            .await;

        if let Some(product) = results.retrieved_products.first() {
            let price = product.localized_price.clone().unwrap_or_default();
            tracing::info!(
                "Product: {}, price: {}",
                product.localized_description,
                price
            );
            Ok(price)
        } else if let Some(invalid) = results.invalid_product_ids.first() {
            tracing::warn!("Invalid product identifier: {}", invalid);
            Err(IapError::InvalidProductId(invalid.clone()))
        } else {
            tracing::error!("Product info request failed: {:?}", results.error);
            Err(IapError::Unknown(results.error))
        }
    }

    /// Fetch metadata for several products at once.
    ///
    /// Unknown ids are dropped as long as at least one product is found.
    pub async fn fetch_products(&self, product_ids: &[String]) -> Result<Vec<Product>> {
        if product_ids.is_empty() {
            return Err(IapError::NoProducts);
        }

        self.retry
            .run("fetch_products", || self.try_fetch_products(product_ids))
            .await
    }

    async fn try_fetch_products(&self, product_ids: &[String]) -> Result<Vec<Product>> {
        let results = self.platform.retrieve_products_info(product_ids).await;

        if !results.retrieved_products.is_empty() {
            if !results.invalid_product_ids.is_empty() {
                tracing::warn!(
                    "Ignoring invalid product identifiers: {:?}",
                    results.invalid_product_ids
                );
            }
            return Ok(results.retrieved_products);
        }

        if let Some(error) = results.error {
            tracing::error!("Product info request failed: {}", error);
            return Err(IapError::Unknown(Some(error)));
        }

        match results.invalid_product_ids.into_iter().next() {
            Some(invalid) => Err(IapError::InvalidProductId(invalid)),
            None => Err(IapError::NoRetrievedProduct),
        }
    }

    /// Restore previously completed purchases.
    ///
    /// Any failed entry fails the whole restore, even when other purchases
    /// came back.
    pub async fn restore_purchases(&self) -> Result<Vec<Purchase>> {
        self.retry
            .run("restore_purchases", || self.try_restore_purchases())
            .await
    }

    async fn try_restore_purchases(&self) -> Result<Vec<Purchase>> {
        let results = self.platform.restore_purchases(true).await;

        if !results.restore_failed_purchases.is_empty() {
            tracing::warn!("Restore Failed: {:?}", results.restore_failed_purchases);
            Err(IapError::FailedRestorePurchases(
                results.restore_failed_purchases,
            ))
        } else if !results.restored_purchases.is_empty() {
            tracing::info!(
                "Restore Success: {:?}",
                results
                    .restored_purchases
                    .iter()
                    .map(|p| p.product_id.as_str())
                    .collect::<Vec<_>>()
            );
            Ok(results.restored_purchases)
        } else {
            tracing::info!("Nothing to restore");
            Err(IapError::NoRestorePurchases)
        }
    }

    /// Buy one unit of `product_id`. The transaction is finished by the
    /// platform before this returns.
    pub async fn purchase(&self, product_id: &str) -> Result<PurchaseDetails> {
        self.retry
            .run("purchase", || self.try_purchase(product_id))
            .await
    }

    async fn try_purchase(&self, product_id: &str) -> Result<PurchaseDetails> {
        match self.platform.purchase_product(product_id, 1, true).await {
            Ok(details) => {
                tracing::info!(
                    "Purchase Success: {} ({})",
                    details.product_id,
                    details.transaction.transaction_id
                );
                Ok(details)
            }
            Err(e) if e.code == PlatformErrorCode::PaymentCancelled => {
                tracing::info!("Purchase of {} cancelled", product_id);
                Err(IapError::CanceledPayment)
            }
            Err(e) => {
                tracing::error!("{}", e.code.description());
                Err(IapError::PaymentFailed(e))
            }
        }
    }
}

impl std::fmt::Debug for PurchaseGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PurchaseGateway")
            .field("platform", &"<platform>")
            .field("retry", &self.retry)
            .finish()
    }
}

/// Never-ending stream of transaction updates.
///
/// Dropping the stream unsubscribes from the platform.
pub struct TransactionStateStream {
    platform: Arc<dyn PaymentPlatform>,
    receiver: TransactionReceiver,
    buffered: VecDeque<TransactionUpdate>,
}

impl TransactionStateStream {
    fn accept(&mut self, batch: Vec<Purchase>) {
        for purchase in batch {
            let state = purchase.transaction.state;
            if state.is_completed() && purchase.needs_finish_transaction {
                self.platform.finish_transaction(&purchase.transaction);
            }
            tracing::debug!(
                "Transaction {} for {}: {}",
                purchase.transaction.transaction_id,
                purchase.product_id,
                state
            );
            self.buffered.push_back(TransactionUpdate::from(&purchase));
        }
    }
}

impl Stream for TransactionStateStream {
    type Item = TransactionUpdate;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(update) = this.buffered.pop_front() {
                return Poll::Ready(Some(update));
            }
            match ready!(this.receiver.poll_recv(cx)) {
                Some(batch) => this.accept(batch),
                None => return Poll::Ready(None),
            }
        }
    }
}
