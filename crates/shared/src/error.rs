//! Error types shared by AssisText billing crates

use serde::Deserialize;
use thiserror::Error;

/// Request validation failures, raised before anything is sent to the API
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Nothing to update: {0} has no changed fields")]
    EmptyUpdate(&'static str),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: String,
    },
}

/// Error body returned by the billing API on non-2xx responses
///
/// The API is not consistent about which key carries the text, so both
/// `message` and `error` are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

impl ApiErrorBody {
    /// Best human-readable text in the body, if any
    pub fn text(&self) -> Option<&str> {
        let non_blank = |s: &&str| !s.trim().is_empty();
        self.message
            .as_deref()
            .filter(non_blank)
            .or_else(|| self.error.as_deref().filter(non_blank))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_prefers_message() {
        let body: ApiErrorBody =
            serde_json::from_str(r#"{"message":"Card declined","error":"payment_failed"}"#).unwrap();
        assert_eq!(body.text(), Some("Card declined"));
    }

    #[test]
    fn test_error_body_falls_back_to_error_key() {
        let body: ApiErrorBody = serde_json::from_str(r#"{"error":"Plan not found"}"#).unwrap();
        assert_eq!(body.text(), Some("Plan not found"));

        let empty: ApiErrorBody = serde_json::from_str(r#"{"message":"  "}"#).unwrap();
        assert_eq!(empty.text(), None);
    }
}
