use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub product_id: String,
    pub product_name: String,
    pub storage_dir: PathBuf,
    /// Sandbox catalog JSON; a single-product catalog is used when unset
    pub catalog_path: Option<PathBuf>,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            product_id: env::var("IAPKIT_PRODUCT_ID")
                .unwrap_or_else(|_| "com.example.randomcolor".to_string()),
            product_name: env::var("IAPKIT_PRODUCT_NAME")
                .unwrap_or_else(|_| "RandomColor".to_string()),
            storage_dir: env::var("IAPKIT_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
            catalog_path: env::var("IAPKIT_CATALOG").ok().map(PathBuf::from),
            retry_max_attempts: env_or("IAPKIT_RETRY_MAX_ATTEMPTS", 3),
            retry_base_delay_ms: env_or("IAPKIT_RETRY_BASE_DELAY_MS", 500),
            retry_max_delay_ms: env_or("IAPKIT_RETRY_MAX_DELAY_MS", 10_000),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }
}
