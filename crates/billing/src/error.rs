//! Billing error types

use assistext_shared::ValidationError;
use thiserror::Error;

/// Billing client errors
///
/// Cloneable so the resource cache can keep the last failure next to the
/// last good value.
#[derive(Debug, Clone, Error)]
pub enum BillingError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Billing API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid response from billing API: {0}")]
    Decode(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No active subscription")]
    NoActiveSubscription,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Billing store has been disposed")]
    Disposed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BillingError {
    /// Returns true if a query hitting this error should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            BillingError::Network(_) | BillingError::Timeout => true,
            BillingError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Text suitable for a toast
    pub fn user_message(&self) -> String {
        match self {
            BillingError::Network(_) => {
                "Unable to reach the billing service. Check your connection and try again."
                    .to_string()
            }
            BillingError::Timeout => "The billing service took too long to respond.".to_string(),
            BillingError::Api { message, .. } => message.clone(),
            BillingError::Unauthorized(_) => "Your session has expired. Please sign in again.".to_string(),
            BillingError::NotFound(what) => format!("{} could not be found.", what),
            BillingError::InvalidInput(msg) => msg.clone(),
            BillingError::NoActiveSubscription => "No active subscription".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for BillingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BillingError::Timeout
        } else if err.is_decode() {
            BillingError::Decode(err.to_string())
        } else {
            BillingError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BillingError {
    fn from(err: serde_json::Error) -> Self {
        BillingError::Decode(err.to_string())
    }
}

impl From<ValidationError> for BillingError {
    fn from(err: ValidationError) -> Self {
        BillingError::InvalidInput(err.to_string())
    }
}

impl From<std::io::Error> for BillingError {
    fn from(err: std::io::Error) -> Self {
        BillingError::Download(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
