//! HTTP response classification
//!
//! The API reports failure in three ways: an error status code, an error
//! envelope returned with status 200, and (for boolean actions) any body other
//! than the literal `true`. Callers must look at the body, not just the status.

use super::http::{RawResponse, TransportError};
use super::request::RequestTarget;
use crate::error::{SlError, SlResult};
use serde::Deserialize;

/// What a successful response body is expected to look like
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// Raw `true` / `false` text
    Boolean,
    /// A single JSON entity
    Object,
    /// A JSON array
    List,
}

/// Error body returned by the API: `{"error": "...", "code": "SoftLayer_Exception_..."}`
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(default)]
    pub code: Option<String>,
}

impl ErrorEnvelope {
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str(body.trim()).ok()
    }
}

/// Outcome of one HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Ok(String),
    TransportFailure(String),
    HttpError {
        code: u16,
        message: String,
        exception: Option<String>,
    },
    ApplicationError {
        message: String,
        exception: Option<String>,
    },
}

/// Status codes the API uses for failures, including 5xx validation errors
pub fn is_error_code(status: u16) -> bool {
    status >= 400
}

pub fn classify(outcome: Result<RawResponse, TransportError>, shape: ResponseShape) -> Verdict {
    let response = match outcome {
        Ok(response) => response,
        Err(e) => return Verdict::TransportFailure(e.to_string()),
    };

    if is_error_code(response.status) {
        return match ErrorEnvelope::parse(&response.body) {
            Some(envelope) => Verdict::HttpError {
                code: response.status,
                message: envelope.error,
                exception: envelope.code,
            },
            None => Verdict::HttpError {
                code: response.status,
                message: fallback_message(&response),
                exception: None,
            },
        };
    }

    match shape {
        ResponseShape::Boolean => {
            let body = response.body.trim();
            if body == "true" {
                return Verdict::Ok(body.to_string());
            }
            match ErrorEnvelope::parse(body) {
                Some(envelope) => Verdict::ApplicationError {
                    message: envelope.error,
                    exception: envelope.code,
                },
                None => Verdict::ApplicationError {
                    message: format!("expected `true`, got `{}`", body),
                    exception: None,
                },
            }
        },
        ResponseShape::Object | ResponseShape::List => match ErrorEnvelope::parse(&response.body) {
            Some(envelope) => Verdict::ApplicationError {
                message: envelope.error,
                exception: envelope.code,
            },
            None => Verdict::Ok(response.body),
        },
    }
}

fn fallback_message(response: &RawResponse) -> String {
    let body = response.body.trim();
    if !body.is_empty() {
        return body.to_string();
    }
    reqwest::StatusCode::from_u16(response.status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("request failed")
        .to_string()
}

impl Verdict {
    /// Attach the service and action of `target` to a failing verdict
    pub fn into_result(self, target: &RequestTarget) -> SlResult<String> {
        let service = target.service().to_string();
        let action = target.action().to_string();
        match self {
            Verdict::Ok(body) => Ok(body),
            Verdict::TransportFailure(message) => Err(SlError::Transport {
                service,
                action,
                message,
            }),
            Verdict::HttpError {
                code,
                message,
                exception,
            } => Err(SlError::Http {
                service,
                action,
                code,
                message,
                exception,
            }),
            Verdict::ApplicationError { message, exception } => Err(SlError::Application {
                service,
                action,
                message,
                exception,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> Result<RawResponse, TransportError> {
        Ok(RawResponse {
            status,
            body: body.to_string(),
        })
    }

    #[test]
    fn test_transport_failure() {
        let verdict = classify(
            Err(TransportError("connection refused".to_string())),
            ResponseShape::Object,
        );
        assert_eq!(
            verdict,
            Verdict::TransportFailure("connection refused".to_string())
        );
    }

    #[test]
    fn test_boolean_true_is_success() {
        assert_eq!(
            classify(response(200, "true"), ResponseShape::Boolean),
            Verdict::Ok("true".to_string())
        );
    }

    #[test]
    fn test_boolean_false_is_application_error() {
        let verdict = classify(response(200, "false"), ResponseShape::Boolean);
        assert!(matches!(verdict, Verdict::ApplicationError { .. }));
    }

    #[test]
    fn test_boolean_error_envelope_is_application_error() {
        let verdict = classify(
            response(200, r#"{"error":"Unable to cancel","code":"SoftLayer_Exception_Public"}"#),
            ResponseShape::Boolean,
        );
        assert_eq!(
            verdict,
            Verdict::ApplicationError {
                message: "Unable to cancel".to_string(),
                exception: Some("SoftLayer_Exception_Public".to_string()),
            }
        );
    }

    #[test]
    fn test_object_error_envelope_with_200() {
        let verdict = classify(
            response(200, r#"{"error":"Invalid order container"}"#),
            ResponseShape::Object,
        );
        assert_eq!(
            verdict,
            Verdict::ApplicationError {
                message: "Invalid order container".to_string(),
                exception: None,
            }
        );
    }

    #[test]
    fn test_object_success() {
        let body = r#"{"id":12,"name":"web"}"#;
        assert_eq!(
            classify(response(200, body), ResponseShape::Object),
            Verdict::Ok(body.to_string())
        );
        assert_eq!(
            classify(response(200, "[]"), ResponseShape::List),
            Verdict::Ok("[]".to_string())
        );
    }

    #[test]
    fn test_server_error_with_envelope() {
        let verdict = classify(
            response(
                500,
                r#"{"error":"There is currently an active transaction","code":"SoftLayer_Exception_Public"}"#,
            ),
            ResponseShape::Boolean,
        );
        assert_eq!(
            verdict,
            Verdict::HttpError {
                code: 500,
                message: "There is currently an active transaction".to_string(),
                exception: Some("SoftLayer_Exception_Public".to_string()),
            }
        );
    }

    #[test]
    fn test_error_without_body_uses_reason() {
        let verdict = classify(response(404, ""), ResponseShape::Object);
        assert_eq!(
            verdict,
            Verdict::HttpError {
                code: 404,
                message: "Not Found".to_string(),
                exception: None,
            }
        );
    }

    #[test]
    fn test_into_result_carries_service_and_action() {
        let target = RequestTarget::by_id("SoftLayer_Billing_Item", 9, "cancelService");
        let err = Verdict::HttpError {
            code: 500,
            message: "boom".to_string(),
            exception: None,
        }
        .into_result(&target)
        .unwrap_err();
        assert_eq!(err.to_string(), "SoftLayer_Billing_Item::cancelService: HTTP 500: boom");
    }
}
