//! Error taxonomy
//!
//! Every component returns an [`SlError`] to its caller. Errors raised at an
//! HTTP boundary carry the service and action that failed so the message stays
//! useful without knowledge of this crate's internals.

use std::time::Duration;
use thiserror::Error;

/// Errors produced while talking to the SoftLayer API
#[derive(Debug, Error)]
pub enum SlError {
    /// Connection, TLS or timeout failure below HTTP. Never retried.
    #[error("{service}::{action}: transport failure: {message}")]
    Transport {
        service: String,
        action: String,
        message: String,
    },

    /// The API rejected the request with an error status code
    #[error("{service}::{action}: HTTP {code}: {message}")]
    Http {
        service: String,
        action: String,
        code: u16,
        message: String,
        /// Exception class from the error envelope, e.g. `SoftLayer_Exception_ObjectNotFound`
        exception: Option<String>,
    },

    /// A 200 response that nonetheless reports failure
    #[error("{service}::{action}: {message}")]
    Application {
        service: String,
        action: String,
        message: String,
        exception: Option<String>,
    },

    #[error("{kind} {key} not found")]
    NotFound { kind: String, key: String },

    /// A uniqueness assumption was violated
    #[error("expected exactly one {what}, found {count}")]
    Ambiguous { what: String, count: usize },

    #[error("timed out after {elapsed:?} waiting for {what} ({attempts} probes, last state: {last_state})")]
    Timeout {
        what: String,
        elapsed: Duration,
        attempts: u32,
        last_state: String,
    },

    /// A poll probe reported a label that is neither pending nor a target
    #[error("unexpected state {label:?} while waiting for {what} (expected one of {expected:?})")]
    UnexpectedState {
        what: String,
        label: String,
        expected: Vec<String>,
    },

    /// Caught before any request is built
    #[error("invalid {resource}: {}", .problems.join("; "))]
    Validation {
        resource: String,
        problems: Vec<String>,
    },

    #[error("{service}::{action}: unexpected response body: {source}")]
    Decode {
        service: String,
        action: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid parameters for {resource}: {source}")]
    InvalidParameters {
        resource: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    Unsupported(String),
}

impl SlError {
    pub fn not_found(kind: impl Into<String>, key: impl ToString) -> Self {
        Self::NotFound {
            kind: kind.into(),
            key: key.to_string(),
        }
    }

    pub fn validation(resource: impl Into<String>, problems: Vec<String>) -> Self {
        Self::Validation {
            resource: resource.into(),
            problems,
        }
    }

    /// True for a failed lookup, including a 404 from a direct get
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Http { code: 404, .. } => true,
            Self::Http { exception, .. } | Self::Application { exception, .. } => exception
                .as_deref()
                .is_some_and(|e| e == "SoftLayer_Exception_ObjectNotFound"),
            _ => false,
        }
    }

    /// The message the remote API returned, if this error came from a response
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            Self::Http { message, .. } | Self::Application { message, .. } => Some(message),
            _ => None,
        }
    }
}

pub type SlResult<T> = Result<T, SlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_display_keeps_code_and_message() {
        let err = SlError::Http {
            service: "SoftLayer_Billing_Item".to_string(),
            action: "cancelService".to_string(),
            code: 500,
            message: "There is currently an active transaction".to_string(),
            exception: Some("SoftLayer_Exception_Public".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "SoftLayer_Billing_Item::cancelService: HTTP 500: There is currently an active transaction"
        );
    }

    #[test]
    fn test_validation_enumerates_problems() {
        let err = SlError::validation(
            "scale policy",
            vec!["missing name".to_string(), "missing scale_actions".to_string()],
        );
        assert_eq!(
            err.to_string(),
            "invalid scale policy: missing name; missing scale_actions"
        );
    }

    #[test]
    fn test_is_not_found() {
        assert!(SlError::not_found("datacenter", "nowhere").is_not_found());
        let http_404 = SlError::Http {
            service: "SoftLayer_Scale_Group".to_string(),
            action: "getObject".to_string(),
            code: 404,
            message: "Unable to find object".to_string(),
            exception: None,
        };
        assert!(http_404.is_not_found());
        assert!(!SlError::Unsupported("x".to_string()).is_not_found());
    }
}
