//! Payment platform abstraction.
//!
//! The gateway never talks to a storefront directly; it drives a
//! [`PaymentPlatform`]. Production builds plug in a binding to the real
//! platform SDK, while the demo binary and the tests use [`SandboxPlatform`].

mod sandbox;

pub use sandbox::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use tokio::sync::mpsc;

use crate::types::{PaymentTransaction, Product, Purchase, PurchaseDetails};

/// Error codes reported by the payment platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PlatformErrorCode {
    Unknown,
    ClientInvalid,
    PaymentCancelled,
    PaymentInvalid,
    PaymentNotAllowed,
    StoreProductNotAvailable,
    CloudServicePermissionDenied,
    CloudServiceNetworkConnectionFailed,
    CloudServiceRevoked,
    /// The platform could not reach its backend
    Network,
}

impl PlatformErrorCode {
    /// Human-readable description for diagnostics.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown error. Please contact support",
            Self::ClientInvalid => "Not allowed to make the payment",
            Self::PaymentCancelled => "The payment was cancelled",
            Self::PaymentInvalid => "The purchase identifier was invalid",
            Self::PaymentNotAllowed => "The device is not allowed to make the payment",
            Self::StoreProductNotAvailable => {
                "The product is not available in the current storefront"
            }
            Self::CloudServicePermissionDenied => {
                "Access to cloud service information is not allowed"
            }
            Self::CloudServiceNetworkConnectionFailed => "Could not connect to the network",
            Self::CloudServiceRevoked => "User has revoked permission to use this cloud service",
            Self::Network => "The network connection was lost",
        }
    }

    /// Network-class failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::CloudServiceNetworkConnectionFailed | Self::Network)
    }
}

/// Error reported by the payment platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformError {
    pub code: PlatformErrorCode,
    pub message: String,
}

impl PlatformError {
    pub fn new(code: PlatformErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn from_code(code: PlatformErrorCode) -> Self {
        Self::new(code, code.description())
    }
}

impl std::fmt::Display for PlatformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code.as_ref())
    }
}

impl std::error::Error for PlatformError {}

/// Result of a product info query.
///
/// The platform may answer with products, invalid ids, an error, or any mix
/// of them; interpretation is up to the caller.
#[derive(Debug, Clone, Default)]
pub struct RetrieveResults {
    pub retrieved_products: Vec<Product>,
    pub invalid_product_ids: Vec<String>,
    pub error: Option<PlatformError>,
}

/// Result of a restore request
#[derive(Debug, Clone, Default)]
pub struct RestoreResults {
    pub restored_purchases: Vec<Purchase>,
    pub restore_failed_purchases: Vec<(PlatformError, Option<String>)>,
}

/// Result of a purchase request
pub type PurchaseResult = std::result::Result<PurchaseDetails, PlatformError>;

/// Batches of purchases delivered by the platform's transaction queue
pub type TransactionReceiver = mpsc::UnboundedReceiver<Vec<Purchase>>;

/// The storefront the gateway drives.
///
/// Callback-style SDK entry points map onto async methods; the transaction
/// queue maps onto a channel that stays open for the life of the platform.
#[async_trait]
pub trait PaymentPlatform: Send + Sync {
    /// Query metadata for the given product ids.
    async fn retrieve_products_info(&self, product_ids: &[String]) -> RetrieveResults;

    /// Purchase a product. When `atomically` is set the platform finishes the
    /// transaction before returning.
    async fn purchase_product(
        &self,
        product_id: &str,
        quantity: u32,
        atomically: bool,
    ) -> PurchaseResult;

    /// Re-deliver previously completed purchases.
    async fn restore_purchases(&self, atomically: bool) -> RestoreResults;

    /// Subscribe to the transaction queue. Transactions that are still
    /// unfinished are delivered to every new subscriber.
    fn transaction_updates(&self) -> TransactionReceiver;

    /// Acknowledge a transaction so it is not redelivered.
    ///
    /// Every open subscriber sees the same batch, so this may be called more
    /// than once for one transaction; only the first call has an effect.
    fn finish_transaction(&self, transaction: &PaymentTransaction);
}
