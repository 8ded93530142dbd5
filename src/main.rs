use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iapkit::config::Config;
use iapkit::{
    EntitlementStore, FileStorage, PlatformErrorCode, PresentationController, PurchaseGateway,
    PurchaseOutcome, SandboxCatalog, SandboxPlatform, ViewState,
};

#[derive(Parser, Debug)]
#[command(name = "iapkit")]
#[command(about = "Walk through in-app purchase flows against a sandbox store")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the current screen state
    Status,
    /// Print the localized price of the product
    Price,
    /// Buy the product
    Buy {
        /// Dismiss the payment sheet instead of paying
        #[arg(long)]
        cancel: bool,
        /// Make the store reject the payment with this error code (e.g. payment_not_allowed)
        #[arg(long, conflicts_with = "cancel")]
        fail: Option<PlatformErrorCode>,
    },
    /// Restore previous purchases
    Restore,
    /// Use the unlocked feature
    Feature,
}

fn print_view(view: &ViewState) {
    println!("entitled:        {}", view.entitled);
    println!("feature button:  {}", enabled(view.feature_enabled));
    println!("buy button:      {} [{}]", enabled(view.buy_enabled), view.buy_title);
    if let Some(color) = view.background {
        println!("background:      {}", color);
    }
    if let Some(error) = &view.error_message {
        println!("error:           {}", error);
    }
}

fn enabled(on: bool) -> &'static str {
    if on { "enabled" } else { "disabled" }
}

fn load_catalog(config: &Config) -> Result<SandboxCatalog, Box<dyn std::error::Error>> {
    match &config.catalog_path {
        Some(path) => {
            tracing::info!("Loading sandbox catalog from {}", path.display());
            Ok(SandboxCatalog::load(path)?)
        }
        None => Ok(SandboxCatalog::single(
            &config.product_id,
            &config.product_name,
            99,
        )),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "iapkit=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let storage = FileStorage::new(&config.storage_dir).ok_or_else(|| {
        format!(
            "storage directory {} does not exist",
            config.storage_dir.display()
        )
    })?;
    tracing::debug!("Using storage at {}", storage.path().display());

    let platform = Arc::new(SandboxPlatform::new(load_catalog(&config)?));
    let gateway = Arc::new(
        PurchaseGateway::new(platform.clone()).with_retry_policy(config.retry_policy()),
    );
    let entitlements = EntitlementStore::new(Arc::new(storage));

    let controller = PresentationController::new(
        Arc::clone(&gateway),
        entitlements,
        &config.product_id,
        &config.product_name,
    );
    controller.load();

    // Give the price lookup a moment so the buy title is populated.
    let mut view = controller.watch_view();
    let _ = tokio::time::timeout(
        Duration::from_secs(2),
        view.wait_for(|v| v.buy_title.contains('(')),
    )
    .await;

    match cli.command {
        Command::Status => {}
        Command::Price => {
            let price = gateway.fetch_localized_price(&config.product_id).await?;
            println!("{}: {}", config.product_id, price);
            return Ok(());
        }
        Command::Buy { cancel, fail } => {
            if cancel {
                platform.script_purchase(PurchaseOutcome::Cancel);
            } else if let Some(code) = fail {
                platform.script_purchase(PurchaseOutcome::Fail(code));
            }
            let _ = controller.tap_buy().await;
        }
        Command::Restore => {
            let _ = controller.tap_restore().await;
        }
        Command::Feature => {
            if controller.tap_feature().is_none() {
                println!("{} is locked; buy or restore it first", config.product_name);
            }
        }
    }

    print_view(&controller.view());
    Ok(())
}
