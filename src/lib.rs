//! # iapkit
//!
//! In-app purchase flows over a pluggable payment platform: product lookup,
//! purchase, restore and transaction-state observation, plus a headless
//! controller that unlocks a feature once it has been paid for.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use iapkit::{
//!     EntitlementStore, MemoryStorage, PresentationController, PurchaseGateway,
//!     SandboxCatalog, SandboxPlatform,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let platform = SandboxPlatform::new(SandboxCatalog::single("pro", "Pro", 299));
//!     let gateway = Arc::new(PurchaseGateway::new(Arc::new(platform)));
//!     let entitlements = EntitlementStore::new(Arc::new(MemoryStorage::new()));
//!
//!     let controller = PresentationController::new(gateway, entitlements, "pro", "Pro");
//!     controller.load();
//!
//!     controller.tap_buy().await?;
//!     assert!(controller.view().feature_enabled);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod controller;
pub mod entitlement;
pub mod error;
pub mod gateway;
pub mod platform;
pub mod retry;
pub mod storage;
pub mod types;

pub use controller::{Color, PresentationController, UiAction, ViewState, transition};
pub use entitlement::EntitlementStore;
pub use error::{IapError, Result, RestoreFailure};
pub use gateway::{PurchaseGateway, TransactionStateStream};
pub use platform::{
    PaymentPlatform, PlatformError, PlatformErrorCode, PurchaseOutcome, SandboxCatalog,
    SandboxPlatform,
};
pub use retry::RetryPolicy;
pub use storage::{FileStorage, MemoryStorage, StorageAdapter};
pub use types::{
    PaymentTransaction, Product, Purchase, PurchaseDetails, TransactionState, TransactionUpdate,
};
