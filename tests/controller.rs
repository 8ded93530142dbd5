//! Presentation controller flows: entitlement, persistence and error display

use std::sync::Arc;

mod common;
use common::*;

// ============ Startup ============

#[tokio::test]
async fn test_fresh_install_starts_locked_with_price_title() {
    let platform = create_test_platform();
    let controller = create_test_controller(&platform, Arc::new(MemoryStorage::new()));
    controller.load();

    let view = wait_for_view(&controller, |v| v.buy_title.contains('(')).await;
    assert_eq!(view.buy_title, "Buy RandomColor ($0.99)");
    assert!(!view.entitled);
    assert!(!view.feature_enabled);
    assert!(view.buy_enabled);
    assert_eq!(controller.tap_feature(), None);
}

#[tokio::test]
async fn test_persisted_entitlement_unlocks_on_load() {
    let platform = create_test_platform();
    let storage = Arc::new(MemoryStorage::new());
    EntitlementStore::new(storage.clone()).grant(PRODUCT_ID);

    let controller = create_test_controller(&platform, storage);
    controller.load();

    let view = controller.view();
    assert!(view.entitled);
    assert!(view.feature_enabled);
    assert!(!view.buy_enabled);
}

#[tokio::test]
async fn test_price_failure_keeps_default_title() {
    let platform = Arc::new(SandboxPlatform::new(SandboxCatalog::default()));
    let controller = create_test_controller(&platform, Arc::new(MemoryStorage::new()));
    controller.load();

    // Let the price task run to completion
    while platform.calls().retrieve_products_info == 0 {
        tokio::task::yield_now().await;
    }
    tokio::task::yield_now().await;
    assert_eq!(controller.view().buy_title, "Buy RandomColor");
}

#[tokio::test]
async fn test_second_load_is_ignored() {
    let platform = create_test_platform();
    let controller = create_test_controller(&platform, Arc::new(MemoryStorage::new()));
    controller.load();
    controller.load();

    wait_for_view(&controller, |v| v.buy_title.contains('(')).await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(platform.calls().retrieve_products_info, 1);
}

// ============ Purchase ============

#[tokio::test]
async fn test_purchase_survives_restart_without_platform_calls() {
    let dir = tempfile::tempdir().unwrap();

    {
        let platform = create_test_platform();
        let storage = Arc::new(FileStorage::new(dir.path()).unwrap());
        let controller = create_test_controller(&platform, storage);

        controller.tap_buy().await.unwrap();
        let view = controller.view();
        assert!(view.entitled);
        assert!(view.feature_enabled);
        assert!(!view.buy_enabled);
        assert_eq!(view.error_message, None);
    }

    // Next launch: fresh platform, same storage
    let platform = create_test_platform();
    let storage: Arc<dyn StorageAdapter> = Arc::new(FileStorage::new(dir.path()).unwrap());
    assert!(EntitlementStore::new(storage.clone()).is_entitled(PRODUCT_ID));

    let controller = create_test_controller(&platform, storage);
    assert!(controller.tap_feature().is_none());
    controller.load();

    assert!(controller.view().feature_enabled);
    assert!(controller.tap_feature().is_some());
    assert_eq!(platform.calls().purchase_product, 0);
    assert_eq!(platform.calls().restore_purchases, 0);
}

#[tokio::test]
async fn test_cancelled_purchase_leaves_entitlement_unchanged() {
    let platform = create_test_platform();
    let storage = Arc::new(MemoryStorage::new());
    let controller = create_test_controller(&platform, storage.clone());
    platform.script_purchase(PurchaseOutcome::Cancel);

    assert_eq!(controller.tap_buy().await, Err(IapError::CanceledPayment));

    let view = controller.view();
    assert!(!view.entitled);
    assert!(!view.feature_enabled);
    assert!(view.buy_enabled);
    assert_eq!(view.error_message.as_deref(), Some("Purchase cancelled"));
    assert!(!EntitlementStore::new(storage).is_entitled(PRODUCT_ID));
}

#[tokio::test]
async fn test_failed_purchase_shows_error_then_clears_on_retry() {
    let platform = create_test_platform();
    let controller = create_test_controller(&platform, Arc::new(MemoryStorage::new()));
    platform.script_purchase(PurchaseOutcome::Fail(PlatformErrorCode::PaymentNotAllowed));

    assert!(controller.tap_buy().await.is_err());
    assert_eq!(
        controller.view().error_message.as_deref(),
        Some("The device is not allowed to make the payment")
    );

    controller.tap_buy().await.unwrap();
    assert_eq!(controller.view().error_message, None);
    assert!(controller.view().feature_enabled);
}

// ============ Restore ============

#[tokio::test]
async fn test_restore_success_persists_entitlement() {
    let platform = create_test_platform();
    platform.grant_ownership(PRODUCT_ID);
    let storage = Arc::new(MemoryStorage::new());
    let controller = create_test_controller(&platform, storage.clone());

    controller.tap_restore().await.unwrap();

    assert!(controller.view().feature_enabled);
    assert!(EntitlementStore::new(storage).is_entitled(PRODUCT_ID));
}

#[tokio::test]
async fn test_restore_with_nothing_shows_error() {
    let platform = create_test_platform();
    let storage = Arc::new(MemoryStorage::new());
    let controller = create_test_controller(&platform, storage.clone());

    assert_eq!(
        controller.tap_restore().await,
        Err(IapError::NoRestorePurchases)
    );
    let view = controller.view();
    assert!(!view.feature_enabled);
    assert_eq!(view.error_message.as_deref(), Some("No purchases to restore"));
    assert!(!EntitlementStore::new(storage).is_entitled(PRODUCT_ID));
}

// ============ Transaction Updates ============

#[tokio::test]
async fn test_purchased_transaction_unlocks_and_persists() {
    let platform = create_test_platform();
    let storage = Arc::new(MemoryStorage::new());
    let controller = create_test_controller(&platform, storage.clone());
    controller.load();

    let tx = platform.enqueue_transaction(PRODUCT_ID, TransactionState::Purchased);

    let view = wait_for_view(&controller, |v| v.entitled).await;
    assert!(view.feature_enabled);
    assert!(!view.buy_enabled);
    assert!(EntitlementStore::new(storage).is_entitled(PRODUCT_ID));
    assert!(platform.finished_transactions().contains(&tx.transaction_id));
}

#[tokio::test]
async fn test_interrupted_purchase_is_delivered_on_load() {
    let platform = create_test_platform();
    platform.enqueue_transaction(PRODUCT_ID, TransactionState::Restored);

    let controller = create_test_controller(&platform, Arc::new(MemoryStorage::new()));
    controller.load();

    wait_for_view(&controller, |v| v.feature_enabled).await;
    assert!(platform.pending_transactions().is_empty());
}

#[tokio::test]
async fn test_non_completed_state_locks_feature() {
    let platform = create_test_platform();
    let controller = create_test_controller(&platform, Arc::new(MemoryStorage::new()));
    controller.load();

    platform.enqueue_transaction(PRODUCT_ID, TransactionState::Purchased);
    wait_for_view(&controller, |v| v.entitled).await;

    platform.enqueue_transaction(PRODUCT_ID, TransactionState::Deferred);
    let view = wait_for_view(&controller, |v| !v.entitled).await;
    assert!(!view.feature_enabled);
    assert!(view.buy_enabled);
}

#[tokio::test]
async fn test_other_products_do_not_move_entitlement() {
    let platform = create_test_platform();
    let storage = Arc::new(MemoryStorage::new());
    let controller = create_test_controller(&platform, storage.clone());
    controller.load();

    platform.enqueue_transaction(PRODUCT_ID, TransactionState::Purchased);
    wait_for_view(&controller, |v| v.entitled && v.buy_title.contains('(')).await;

    let mut rx = controller.watch_view();
    rx.borrow_and_update();
    platform.enqueue_transaction("other", TransactionState::Deferred);
    platform.enqueue_transaction("other", TransactionState::Failed);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert!(!rx.has_changed().unwrap(), "view changed for another product");
    assert!(controller.view().entitled);
    assert!(!EntitlementStore::new(storage).is_entitled("other"));

    // Own-product updates still get through
    platform.enqueue_transaction(PRODUCT_ID, TransactionState::Deferred);
    wait_for_view(&controller, |v| !v.entitled).await;
}

#[tokio::test]
async fn test_other_product_purchase_does_not_unlock() {
    let platform = create_test_platform();
    let controller = create_test_controller(&platform, Arc::new(MemoryStorage::new()));
    controller.load();
    wait_for_view(&controller, |v| v.buy_title.contains('(')).await;

    let mut rx = controller.watch_view();
    rx.borrow_and_update();
    platform.enqueue_transaction("other", TransactionState::Purchased);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert!(!rx.has_changed().unwrap());
    assert!(!controller.view().feature_enabled);
}

#[tokio::test]
async fn test_dropping_controller_cancels_subscriptions() {
    let platform = create_test_platform();
    let storage = Arc::new(MemoryStorage::new());
    let controller = create_test_controller(&platform, storage.clone());
    controller.load();
    drop(controller);

    platform.enqueue_transaction(PRODUCT_ID, TransactionState::Purchased);
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert!(!EntitlementStore::new(storage).is_entitled(PRODUCT_ID));
    assert_eq!(platform.pending_transactions().len(), 1);
}
