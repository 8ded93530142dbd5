//! Test utilities and fixtures for iapkit integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

pub use iapkit::*;

pub const PRODUCT_ID: &str = "p1";
pub const PRODUCT_NAME: &str = "RandomColor";

/// Retry policy with millisecond delays so retry tests stay fast
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

/// Sandbox selling a single $0.99 product
pub fn create_test_platform() -> Arc<SandboxPlatform> {
    Arc::new(SandboxPlatform::new(SandboxCatalog::single(
        PRODUCT_ID,
        PRODUCT_NAME,
        99,
    )))
}

pub fn create_test_gateway(platform: &Arc<SandboxPlatform>) -> Arc<PurchaseGateway> {
    Arc::new(PurchaseGateway::new(platform.clone()).with_retry_policy(fast_retry()))
}

pub fn create_test_controller(
    platform: &Arc<SandboxPlatform>,
    storage: Arc<dyn StorageAdapter>,
) -> PresentationController {
    PresentationController::new(
        create_test_gateway(platform),
        EntitlementStore::new(storage),
        PRODUCT_ID,
        PRODUCT_NAME,
    )
}

/// Wait until the controller's view satisfies `predicate`, failing the test
/// after one second.
pub async fn wait_for_view(
    controller: &PresentationController,
    predicate: impl FnMut(&ViewState) -> bool,
) -> ViewState {
    let mut rx = controller.watch_view();
    let view = tokio::time::timeout(Duration::from_secs(1), rx.wait_for(predicate))
        .await
        .expect("Timed out waiting for view state")
        .expect("View channel closed");
    view.clone()
}
