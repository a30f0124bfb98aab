//! SoftLayer Client
//!
//! Typed calls over a [`Transport`]: every exchange is built from a
//! [`RequestTarget`], classified, then decoded into the expected shape.

use super::auth::Credentials;
use super::classify::{classify, ResponseShape};
use super::http::{SlHttpClient, Transport};
use super::request::{Parameters, RequestTarget};
use crate::error::{SlError, SlResult};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Main SoftLayer client, cheap to clone
#[derive(Clone)]
pub struct SlClient {
    transport: Arc<dyn Transport>,
}

impl SlClient {
    /// Create a client talking to `endpoint` over HTTPS
    pub fn new(endpoint: &str, credentials: Credentials) -> anyhow::Result<Self> {
        let http = SlHttpClient::new(endpoint, credentials)?;
        Ok(Self::with_transport(Arc::new(http)))
    }

    /// Create a client over any transport
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    async fn call(
        &self,
        method: Method,
        target: &RequestTarget,
        body: Option<String>,
        shape: ResponseShape,
    ) -> SlResult<String> {
        let path = target.path();
        tracing::debug!(
            service = target.service(),
            action = target.action(),
            "{} {}",
            method,
            path
        );
        let outcome = self.transport.do_request(method, &path, body).await;
        classify(outcome, shape).into_result(target)
    }

    /// GET a single entity
    pub async fn get<T: DeserializeOwned>(&self, target: &RequestTarget) -> SlResult<T> {
        let body = self.call(Method::GET, target, None, ResponseShape::Object).await?;
        decode(target, &body)
    }

    /// GET a list of entities
    pub async fn list<T: DeserializeOwned>(&self, target: &RequestTarget) -> SlResult<Vec<T>> {
        let body = self.call(Method::GET, target, None, ResponseShape::List).await?;
        decode(target, &body)
    }

    /// POST a parameter envelope and decode the returned entity
    pub async fn post<T, P>(&self, target: &RequestTarget, params: &Parameters<P>) -> SlResult<T>
    where
        T: DeserializeOwned,
        P: Serialize,
    {
        let body = encode(target, params)?;
        let body = self
            .call(Method::POST, target, Some(body), ResponseShape::Object)
            .await?;
        decode(target, &body)
    }

    /// POST to a boolean action; anything but `true` is an error
    pub async fn post_bool<P: Serialize>(
        &self,
        target: &RequestTarget,
        params: &Parameters<P>,
    ) -> SlResult<()> {
        let body = encode(target, params)?;
        self.call(Method::POST, target, Some(body), ResponseShape::Boolean)
            .await
            .map(|_| ())
    }

    /// GET a boolean action such as `cancelService`
    pub async fn get_bool(&self, target: &RequestTarget) -> SlResult<()> {
        self.call(Method::GET, target, None, ResponseShape::Boolean)
            .await
            .map(|_| ())
    }

    /// DELETE through a boolean action such as `deleteObject`
    pub async fn delete_bool(&self, target: &RequestTarget) -> SlResult<()> {
        self.call(Method::DELETE, target, None, ResponseShape::Boolean)
            .await
            .map(|_| ())
    }
}

fn decode<T: DeserializeOwned>(target: &RequestTarget, body: &str) -> SlResult<T> {
    serde_json::from_str(body).map_err(|source| SlError::Decode {
        service: target.service().to_string(),
        action: target.action().to_string(),
        source,
    })
}

fn encode<P: Serialize>(target: &RequestTarget, params: &Parameters<P>) -> SlResult<String> {
    serde_json::to_string(params).map_err(|source| SlError::InvalidParameters {
        resource: target.service().to_string(),
        source,
    })
}

/// Format an API error for terminal display, with a hint for common causes
pub fn format_sl_error(error: &SlError) -> String {
    let hint = match error {
        SlError::Http { code: 401, .. } => {
            Some("Authentication failed. Check your username and API key.")
        },
        SlError::Http { code: 403, .. } => {
            Some("Permission denied. Check the account permissions of this user.")
        },
        SlError::Transport { .. } => Some("Check your network connection and the API endpoint."),
        SlError::Timeout { .. } => {
            Some("The operation may still complete on the provider side; read the resource again later.")
        },
        _ => None,
    };

    match hint {
        Some(hint) => format!("{}\n{}", error, hint),
        None => error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubTransport;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_get_decodes_entity() {
        let stub = StubTransport::new().respond(200, r#"{"id": 5, "name": "hook"}"#);
        let client = SlClient::with_transport(stub.clone());
        let target = RequestTarget::by_id("SoftLayer_Provisioning_Hook", 5, "getObject");

        let value: Value = client.get(&target).await.unwrap();
        assert_eq!(value["name"], "hook");
        assert_eq!(
            stub.requests()[0].path,
            "SoftLayer_Provisioning_Hook/5/getObject.json"
        );
    }

    #[tokio::test]
    async fn test_post_wraps_parameters() {
        let stub = StubTransport::new().respond(200, r#"{"id": 9}"#);
        let client = SlClient::with_transport(stub.clone());
        let target = RequestTarget::list("SoftLayer_Provisioning_Hook", "createObject");

        let _: Value = client
            .post(&target, &Parameters::single(&json!({"name": "boot"})))
            .await
            .unwrap();

        let request = &stub.requests()[0];
        assert_eq!(request.method, Method::POST);
        let sent: Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(sent, json!({"parameters": [{"name": "boot"}]}));
    }

    #[tokio::test]
    async fn test_decode_error_names_action() {
        let stub = StubTransport::new().respond(200, "not json");
        let client = SlClient::with_transport(stub);
        let target = RequestTarget::by_id("SoftLayer_Scale_Group", 1, "getObject");

        let err = client.get::<Value>(&target).await.unwrap_err();
        assert!(matches!(err, SlError::Decode { .. }));
        assert!(err.to_string().starts_with("SoftLayer_Scale_Group::getObject"));
    }

    #[tokio::test]
    async fn test_bool_action_rejects_error_envelope() {
        let stub = StubTransport::new().respond(200, r#"{"error":"Cannot delete hook"}"#);
        let client = SlClient::with_transport(stub);
        let target = RequestTarget::by_id("SoftLayer_Provisioning_Hook", 3, "deleteObject");

        let err = client.delete_bool(&target).await.unwrap_err();
        assert!(matches!(
            err,
            SlError::Application { ref message, .. } if message == "Cannot delete hook"
        ));
    }

    #[test]
    fn test_format_sl_error_adds_hint() {
        let err = SlError::Http {
            service: "SoftLayer_Account".to_string(),
            action: "getObject".to_string(),
            code: 401,
            message: "Invalid API token.".to_string(),
            exception: None,
        };
        let formatted = format_sl_error(&err);
        assert!(formatted.contains("HTTP 401: Invalid API token."));
        assert!(formatted.contains("Authentication failed"));
    }
}
