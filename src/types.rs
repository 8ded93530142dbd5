//! Type definitions shared by the gateway, the platform and the controller

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Lifecycle stage of a payment transaction as reported by the platform
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransactionState {
    /// Being processed by the platform
    Purchasing,
    /// Charged; must be finished so it is not redelivered
    Purchased,
    /// Failed before being added to the queue
    Failed,
    /// Previously purchased, re-delivered by a restore
    Restored,
    /// Waiting on an outside action (e.g. parental approval)
    Deferred,
}

impl TransactionState {
    /// Whether this state grants the purchased product.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Purchased | Self::Restored)
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// A transaction as held in the platform's transaction queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub transaction_id: String,
    pub product_id: String,
    pub state: TransactionState,
    /// Unix timestamp (seconds)
    pub date: i64,
}

impl PaymentTransaction {
    pub fn new(product_id: &str, state: TransactionState) -> Self {
        Self {
            transaction_id: uuid::Uuid::new_v4().to_string(),
            product_id: product_id.to_string(),
            state,
            date: chrono::Utc::now().timestamp(),
        }
    }
}

/// A purchase delivered by the transaction queue or by a restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub product_id: String,
    pub quantity: u32,
    pub transaction: PaymentTransaction,
    /// False once the transaction has been finished with the platform
    pub needs_finish_transaction: bool,
}

/// Product metadata returned by a product info query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: String,
    pub localized_title: String,
    pub localized_description: String,
    /// Price in minor currency units (cents)
    pub price: i64,
    pub currency_code: String,
    /// Price formatted for the storefront locale, if the platform has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localized_price: Option<String>,
}

/// Result of a completed purchase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseDetails {
    pub product_id: String,
    pub quantity: u32,
    pub product: Option<Product>,
    pub transaction: PaymentTransaction,
    pub needs_finish_transaction: bool,
}

/// One entry emitted by the transaction state stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionUpdate {
    pub product_id: String,
    pub transaction_id: String,
    pub state: TransactionState,
}

impl From<&Purchase> for TransactionUpdate {
    fn from(p: &Purchase) -> Self {
        Self {
            product_id: p.product_id.clone(),
            transaction_id: p.transaction.transaction_id.clone(),
            state: p.transaction.state,
        }
    }
}
