use thiserror::Error;

use crate::platform::PlatformError;

/// A restore entry the platform could not deliver, with the product it
/// belonged to when known.
pub type RestoreFailure = (PlatformError, Option<String>);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IapError {
    #[error("Invalid product identifier: {0}")]
    InvalidProductId(String),

    #[error("Unknown error: {}", .0.as_ref().map(|e| e.to_string()).unwrap_or_else(|| "none reported".into()))]
    Unknown(Option<PlatformError>),

    #[error("Restore failed for {} purchase(s)", .0.len())]
    FailedRestorePurchases(Vec<RestoreFailure>),

    #[error("No product was retrieved")]
    NoRetrievedProduct,

    #[error("No purchases to restore")]
    NoRestorePurchases,

    #[error("No products requested")]
    NoProducts,

    #[error("Payment was cancelled")]
    CanceledPayment,

    #[error("Payment failed: {0}")]
    PaymentFailed(PlatformError),
}

impl IapError {
    /// Whether retrying the operation could succeed.
    ///
    /// Only network-class platform failures qualify. Cancellation, invalid
    /// products and empty restores are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            IapError::Unknown(Some(e)) | IapError::PaymentFailed(e) => e.code.is_transient(),
            IapError::FailedRestorePurchases(failures) => {
                !failures.is_empty() && failures.iter().all(|(e, _)| e.code.is_transient())
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, IapError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::PlatformErrorCode;

    #[test]
    fn test_terminal_errors_not_retryable() {
        assert!(!IapError::CanceledPayment.is_retryable());
        assert!(!IapError::InvalidProductId("p1".into()).is_retryable());
        assert!(!IapError::NoRestorePurchases.is_retryable());
        assert!(!IapError::Unknown(None).is_retryable());
    }

    #[test]
    fn test_network_errors_retryable() {
        let net = PlatformError::from_code(PlatformErrorCode::Network);
        assert!(IapError::PaymentFailed(net.clone()).is_retryable());
        assert!(IapError::Unknown(Some(net.clone())).is_retryable());
        assert!(IapError::FailedRestorePurchases(vec![(net.clone(), None)]).is_retryable());

        let mixed = vec![
            (net, Some("a".to_string())),
            (
                PlatformError::from_code(PlatformErrorCode::PaymentInvalid),
                Some("b".to_string()),
            ),
        ];
        assert!(!IapError::FailedRestorePurchases(mixed).is_retryable());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            IapError::InvalidProductId("p1".into()).to_string(),
            "Invalid product identifier: p1"
        );
        assert_eq!(IapError::Unknown(None).to_string(), "Unknown error: none reported");
    }
}
