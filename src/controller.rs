//! Headless presentation controller for a single purchasable feature.
//!
//! The controller owns the view state (which buttons are enabled, the buy
//! button title, the current background color, any error to show) and keeps
//! it in sync with purchase outcomes. Rendering is left to whoever watches
//! [`PresentationController::watch_view`].

use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::entitlement::EntitlementStore;
use crate::error::{IapError, Result};
use crate::gateway::PurchaseGateway;

/// Opaque RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Color {
    pub fn random() -> Self {
        Self {
            red: rand::random(),
            green: rand::random(),
            blue: rand::random(),
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
    }
}

/// A single change to apply to the view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiAction {
    SetFeatureEnabled(bool),
    SetBuyEnabled(bool),
    SetBuyTitle(String),
    SetBackground(Color),
    ShowError(String),
    ClearError,
}

/// Actions needed when entitlement changes from `old` to `new`.
///
/// The buy control is always the inverse of the feature control.
pub fn transition(old: bool, new: bool) -> Vec<UiAction> {
    if old == new {
        return Vec::new();
    }
    vec![
        UiAction::SetFeatureEnabled(new),
        UiAction::SetBuyEnabled(!new),
    ]
}

/// Text shown to the user for a failed purchase flow.
pub fn user_message(error: &IapError) -> String {
    match error {
        IapError::CanceledPayment => "Purchase cancelled".to_string(),
        IapError::NoRestorePurchases => "No purchases to restore".to_string(),
        IapError::FailedRestorePurchases(_) => {
            "Some purchases could not be restored".to_string()
        }
        IapError::InvalidProductId(_) | IapError::NoRetrievedProduct | IapError::NoProducts => {
            "This product is currently unavailable".to_string()
        }
        IapError::PaymentFailed(e) => e.code.description().to_string(),
        IapError::Unknown(_) => "Something went wrong. Please try again".to_string(),
    }
}

/// Everything a renderer needs to draw the screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    pub entitled: bool,
    pub feature_enabled: bool,
    pub buy_enabled: bool,
    pub buy_title: String,
    pub background: Option<Color>,
    pub error_message: Option<String>,
}

impl ViewState {
    fn new(product_name: &str) -> Self {
        Self {
            entitled: false,
            feature_enabled: false,
            buy_enabled: true,
            buy_title: format!("Buy {}", product_name),
            background: None,
            error_message: None,
        }
    }

    pub fn apply(&mut self, action: UiAction) {
        match action {
            UiAction::SetFeatureEnabled(enabled) => self.feature_enabled = enabled,
            UiAction::SetBuyEnabled(enabled) => self.buy_enabled = enabled,
            UiAction::SetBuyTitle(title) => self.buy_title = title,
            UiAction::SetBackground(color) => self.background = Some(color),
            UiAction::ShowError(message) => self.error_message = Some(message),
            UiAction::ClearError => self.error_message = None,
        }
    }
}

/// Drives the view for one product from the gateway's results.
pub struct PresentationController {
    gateway: Arc<PurchaseGateway>,
    entitlements: EntitlementStore,
    product_id: String,
    product_name: String,
    view: Arc<watch::Sender<ViewState>>,
    subscriptions: Mutex<Vec<JoinHandle<()>>>,
}

impl PresentationController {
    pub fn new(
        gateway: Arc<PurchaseGateway>,
        entitlements: EntitlementStore,
        product_id: &str,
        product_name: &str,
    ) -> Self {
        let (view, _) = watch::channel(ViewState::new(product_name));
        Self {
            gateway,
            entitlements,
            product_id: product_id.to_string(),
            product_name: product_name.to_string(),
            view: Arc::new(view),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    /// Current view state.
    pub fn view(&self) -> ViewState {
        self.view.borrow().clone()
    }

    /// Receiver notified on every view change.
    pub fn watch_view(&self) -> watch::Receiver<ViewState> {
        self.view.subscribe()
    }

    /// Restore persisted entitlement and start the background subscriptions.
    ///
    /// Must be called from within a Tokio runtime. Subscriptions live until
    /// the controller is dropped. Calls after the first are ignored.
    pub fn load(&self) {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !subscriptions.is_empty() {
            tracing::debug!("{} already loaded", self.product_id);
            return;
        }

        if self.entitlements.is_entitled(&self.product_id) {
            tracing::info!("{} already entitled", self.product_id);
            set_entitled(&self.view, true);
        }

        let transactions = {
            let mut stream = self.gateway.observe_transaction_state();
            let view = Arc::clone(&self.view);
            let entitlements = self.entitlements.clone();
            let product_id = self.product_id.clone();

            tokio::spawn(async move {
                while let Some(update) = stream.next().await {
                    if update.product_id != product_id {
                        continue;
                    }
                    if update.state.is_completed() {
                        entitlements.grant(&product_id);
                        set_entitled(&view, true);
                    } else {
                        set_entitled(&view, false);
                    }
                }
                tracing::debug!("Transaction stream closed");
            })
        };

        let price = {
            let gateway = Arc::clone(&self.gateway);
            let view = Arc::clone(&self.view);
            let product_id = self.product_id.clone();
            let product_name = self.product_name.clone();

            tokio::spawn(async move {
                match gateway.fetch_localized_price(&product_id).await {
                    Ok(price) => {
                        let title = format!("Buy {} ({})", product_name, price);
                        view.send_modify(|v| v.apply(UiAction::SetBuyTitle(title)));
                    }
                    Err(e) => tracing::warn!("Could not load price for {}: {}", product_id, e),
                }
            })
        };

        subscriptions.extend([transactions, price]);
    }

    /// Buy the product. On success the entitlement is persisted.
    pub async fn tap_buy(&self) -> Result<()> {
        self.apply(UiAction::ClearError);

        match self.gateway.purchase(&self.product_id).await {
            Ok(_) => {
                self.entitlements.grant(&self.product_id);
                set_entitled(&self.view, true);
                Ok(())
            }
            Err(e) => {
                tracing::error!("error {}", e);
                self.apply(UiAction::ShowError(user_message(&e)));
                Err(e)
            }
        }
    }

    /// Restore purchases. On success the entitlement is persisted.
    pub async fn tap_restore(&self) -> Result<()> {
        self.apply(UiAction::ClearError);

        match self.gateway.restore_purchases().await {
            Ok(purchases) => {
                for purchase in &purchases {
                    self.entitlements.grant(&purchase.product_id);
                }
                self.entitlements.grant(&self.product_id);
                set_entitled(&self.view, true);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Restore failed: {}", e);
                self.apply(UiAction::ShowError(user_message(&e)));
                Err(e)
            }
        }
    }

    /// Use the unlocked feature: pick a new random background.
    ///
    /// Returns `None` while the feature is locked.
    pub fn tap_feature(&self) -> Option<Color> {
        if !self.view.borrow().feature_enabled {
            return None;
        }
        let color = Color::random();
        self.apply(UiAction::SetBackground(color));
        Some(color)
    }

    fn apply(&self, action: UiAction) {
        self.view.send_modify(|v| v.apply(action));
    }
}

fn set_entitled(view: &watch::Sender<ViewState>, entitled: bool) {
    view.send_if_modified(|v| {
        let actions = transition(v.entitled, entitled);
        v.entitled = entitled;
        let changed = !actions.is_empty();
        for action in actions {
            v.apply(action);
        }
        changed
    });
}

impl Drop for PresentationController {
    fn drop(&mut self) {
        let subscriptions = self
            .subscriptions
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for handle in subscriptions.drain(..) {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for PresentationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresentationController")
            .field("product_id", &self.product_id)
            .field("view", &*self.view.borrow())
            .finish()
    }
}
